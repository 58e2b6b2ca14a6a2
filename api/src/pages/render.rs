//! HTML for the view and edit pages

use axum::response::Html;

use crate::routing::Action;
use crate::storage::Page;

/// Escape text for use in element content and double-quoted attributes
pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&#34;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

pub fn render_view(page: &Page) -> Html<String> {
    let title = escape_html(&page.title);
    Html(format!(
        "<h1>{title}</h1>\n\n\
         <p>[<a href=\"{edit}\">edit</a>]</p>\n\n\
         <div>{body}</div>\n",
        title = title,
        edit = escape_html(&Action::Edit.path_for(&page.title)),
        body = escape_html(&page.body_text()),
    ))
}

pub fn render_edit(page: &Page) -> Html<String> {
    let title = escape_html(&page.title);
    Html(format!(
        "<h1>Editing {title}</h1>\n\n\
         <form action=\"{save}\" method=\"POST\">\n\
         <div><textarea name=\"body\" rows=\"20\" cols=\"80\">{body}</textarea></div>\n\
         <div><input type=\"submit\" value=\"Save\"></div>\n\
         </form>\n",
        title = title,
        save = escape_html(&Action::Save.path_for(&page.title)),
        body = escape_html(&page.body_text()),
    ))
}
