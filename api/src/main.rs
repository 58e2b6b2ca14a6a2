#[tokio::main]
async fn main() {
    if let Err(e) = wiki_api::run_server().await {
        eprintln!("wiki-api: {:#}", e);
        std::process::exit(1);
    }
}
