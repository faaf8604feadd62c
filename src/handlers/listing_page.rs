//! HTML rendering of the catalog listing with its search box and upload form.

use crate::{
    models::record::Record,
    services::catalog_service::{CatalogSettings, Schema},
};

const TAG_FIELDS: [(&str, &str); 5] = [
    ("district", "District"),
    ("block", "Block"),
    ("gp", "GP"),
    ("polling_station", "Polling station"),
    ("year", "Year"),
];

/// Render the listing page for `records`, echoing `search` into the search box.
pub fn render_listing(records: &[Record], search: &str, settings: &CatalogSettings) -> String {
    let tagged = settings.schema == Schema::Tagged;
    let mut html = String::from(concat!(
        "<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"UTF-8\">",
        "<title>PDF Catalog</title></head><body><h1>PDF Catalog</h1>"
    ));

    html.push_str(&format!(
        concat!(
            r#"<form method="get" action="/">"#,
            r#"<input type="text" name="search" value="{}" placeholder="Search">"#,
            r#"<button type="submit">Search</button></form>"#
        ),
        html_escape(search)
    ));

    html.push_str(r#"<form method="post" action="/upload" enctype="multipart/form-data">"#);
    if tagged {
        for (name, label) in TAG_FIELDS {
            html.push_str(&format!(
                r#"<label>{label} <input type="text" name="{name}" required></label>"#
            ));
        }
        html.push_str(r#"<label>Title <input type="text" name="title"></label>"#);
    } else {
        html.push_str(r#"<label>Title <input type="text" name="title" required></label>"#);
    }
    html.push_str(concat!(
        r#"<label>Uploader <input type="text" name="uploader"></label>"#,
        r#"<input type="file" name="pdf" accept="application/pdf,.pdf" multiple required>"#,
        r#"<button type="submit">Upload</button></form>"#
    ));

    if records.is_empty() {
        html.push_str("<p>No files found.</p>");
    } else {
        html.push_str("<table><thead><tr>");
        if tagged {
            for (_, label) in TAG_FIELDS {
                html.push_str(&format!("<th>{label}</th>"));
            }
        }
        html.push_str("<th>Title</th><th>File</th><th>Uploaded</th><th>By</th><th></th>");
        html.push_str("</tr></thead><tbody>");
        for record in records {
            push_row(&mut html, record, tagged);
        }
        html.push_str("</tbody></table>");
    }

    html.push_str("</body></html>");
    html
}

fn push_row(html: &mut String, record: &Record, tagged: bool) {
    let id = urlencoding::encode(&record.id);
    html.push_str("<tr>");
    if tagged {
        let values = record.tags.as_ref().map(|t| t.values()).unwrap_or([""; 5]);
        for value in values {
            html.push_str(&format!("<td>{}</td>", html_escape(value)));
        }
    }
    html.push_str(&format!(
        concat!(
            "<td>{title}</td>",
            r#"<td><a href="/view/{id}">{filename}</a></td>"#,
            "<td>{uploaded}</td><td>{uploader}</td>",
            r#"<td><a href="/download/{id}">Download</a> "#,
            r#"<form method="post" action="/delete/{id}" style="display:inline">"#,
            r#"<button type="submit">Delete</button></form></td>"#
        ),
        title = html_escape(&record.title),
        id = id,
        filename = html_escape(&record.filename),
        uploaded = html_escape(&record.uploaded_at),
        uploader = html_escape(&record.uploader),
    ));
    html.push_str("</tr>");
}

fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::record::Tags;

    fn record() -> Record {
        Record {
            id: "report #1.pdf".into(),
            title: "<b>Minutes</b>".into(),
            tags: Some(Tags {
                district: "Khordha".into(),
                block: "Balianta".into(),
                gp: "Benupur".into(),
                polling_station: "PS 12".into(),
                year: "2024".into(),
            }),
            uploader: "clerk".into(),
            filename: "report #1.pdf".into(),
            storage_path: "report #1.pdf".into(),
            size_bytes: 1,
            uploaded_at: "2025-01-01 10:00:00".into(),
            public_url: None,
        }
    }

    #[test]
    fn escapes_text_and_encodes_links() {
        let html = render_listing(&[record()], "\"x\"", &CatalogSettings::default());
        assert!(html.contains("&lt;b&gt;Minutes&lt;/b&gt;"));
        assert!(html.contains(r#"href="/view/report%20%231.pdf""#));
        assert!(html.contains(r#"value="&quot;x&quot;""#));
        assert!(!html.contains("<th>District</th>"));
    }

    #[test]
    fn tagged_schema_shows_tag_columns_and_inputs() {
        let settings = CatalogSettings {
            schema: Schema::Tagged,
            ..Default::default()
        };
        let html = render_listing(&[record()], "", &settings);
        assert!(html.contains("<th>Polling station</th>"));
        assert!(html.contains(r#"name="polling_station" required"#));
        assert!(html.contains("<td>Benupur</td>"));
    }

    #[test]
    fn empty_listing_says_so() {
        let html = render_listing(&[], "", &CatalogSettings::default());
        assert!(html.contains("No files found."));
    }
}
