//! Server-rendered result page.

use docsum::document::format_timestamp;
use docsum::{DocumentRecord, DocumentStatus};

/// Escapes text for use inside HTML element content and quoted attributes.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn render_result(record: &DocumentRecord) -> String {
    let id = escape_html(&record.document_id);
    let body = match record.status {
        DocumentStatus::Done => format!(
            "<h2>Summary</h2>\n<p class=\"summary\">{}</p>\n\
             <button id=\"regenerate\" data-id=\"{}\">Regenerate</button>\n\
             <p id=\"alternative\" class=\"summary\"></p>",
            escape_html(record.result.as_deref().unwrap_or_default()),
            id
        ),
        DocumentStatus::Error => format!(
            "<h2>Summary failed</h2>\n<p class=\"error\">{}</p>",
            escape_html(record.error.as_deref().unwrap_or("Unknown error"))
        ),
        // refresh until the worker has written the outcome
        DocumentStatus::Processing => {
            "<p>Summary in progress. This page refreshes automatically.</p>\n\
             <meta http-equiv=\"refresh\" content=\"3\">"
                .to_string()
        }
        DocumentStatus::Uploaded => "<p>No summary has been requested yet.</p>".to_string(),
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{filename} - docsum</title>
<style>
body {{ font-family: sans-serif; max-width: 48rem; margin: 2rem auto; padding: 0 1rem; }}
.summary {{ white-space: pre-wrap; background: #f5f5f5; padding: 1rem; }}
.error {{ color: #b00020; }}
dt {{ font-weight: bold; }}
</style>
</head>
<body>
<h1>{filename}</h1>
<dl>
<dt>Document</dt><dd>{id}</dd>
<dt>Status</dt><dd>{status}</dd>
<dt>Uploaded</dt><dd>{created_at}</dd>
</dl>
{body}
<p><a href="/">Upload another document</a></p>
<script>
const button = document.getElementById("regenerate");
if (button) {{
  button.addEventListener("click", async () => {{
    button.disabled = true;
    const response = await fetch("/regenerate", {{
      method: "POST",
      headers: {{ "Content-Type": "application/json" }},
      body: JSON.stringify({{ document_id: button.dataset.id }}),
    }});
    const payload = await response.json();
    document.getElementById("alternative").textContent =
      response.ok ? payload.summary : payload.detail;
    button.disabled = false;
  }});
}}
</script>
</body>
</html>
"#,
        filename = escape_html(&record.filename),
        id = id,
        status = record.status,
        created_at = format_timestamp(record.created_at),
        body = body,
    )
}
