//! HTML page rendering for the rating UI

use qc_common::{JudgmentKind, RatingValue, Step};

use crate::workflow::RenderedImage;

/// Escape text for HTML element and attribute content
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn layout(title: &str, body: &str, scripts: &str) -> String {
    let version = env!("CARGO_PKG_VERSION");
    let git_hash = env!("GIT_HASH");
    let build_timestamp = env!("BUILD_TIMESTAMP");

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>QC - {title}</title>
    <style>
        body {{
            font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif;
            background: #1a1a1a;
            color: #e0e0e0;
            margin: 0;
        }}
        header {{
            display: flex;
            justify-content: space-between;
            align-items: center;
            background: #2a2a2a;
            border-bottom: 1px solid #3a3a3a;
            padding: 12px 20px;
        }}
        header a {{ color: #4a9eff; text-decoration: none; font-size: 22px; }}
        .build-info {{ color: #888; font-family: 'Courier New', monospace; font-size: 12px; }}
        main {{ max-width: 1200px; margin: 20px auto; padding: 0 20px; }}
        .qc-image {{ max-width: 100%; border: 1px solid #3a3a3a; cursor: crosshair; }}
        .error {{ background: #5a1f1f; border: 1px solid #a33; padding: 10px; margin-bottom: 16px; }}
        .actions button {{ font-size: 16px; padding: 8px 20px; margin-right: 8px; }}
        .meta {{ color: #888; font-size: 13px; }}
        textarea {{ width: 100%; max-width: 600px; }}
    </style>
</head>
<body>
    <header>
        <a href="/">QC</a>
        <div class="build-info">v{version} [{git_hash}] {build_timestamp}</div>
    </header>
    <main>
{body}
    </main>
{scripts}
</body>
</html>
"#,
        title = escape_html(title),
    )
}

/// Step chooser
pub fn index_page(user: Option<&str>) -> String {
    let options: String = Step::ALL
        .iter()
        .map(|step| format!(r#"            <option value="{}">{}</option>"#, step.slug(), step))
        .collect::<Vec<_>>()
        .join("\n");

    let greeting = match user {
        Some(user) => format!("<p>Signed in as <strong>{}</strong></p>", escape_html(user)),
        None => "<p class=\"meta\">Ratings will be recorded anonymously.</p>".to_string(),
    };

    let body = format!(
        r#"        <h1>Choose a pipeline step</h1>
        {greeting}
        <form method="post" action="/">
            <select name="step">
{options}
            </select>
            <button type="submit">Start rating</button>
        </form>"#
    );

    layout("Choose step", &body, "")
}

/// Image plus judgment form; also served alone as the `/next` partial
pub fn image_fragment(step: Step, image: &RenderedImage, error: Option<&str>) -> String {
    let error = error
        .map(|msg| format!(r#"<div class="error">{}</div>"#, escape_html(msg)))
        .unwrap_or_default();

    let controls = match step.judgment_kind() {
        JudgmentKind::Rating => {
            let buttons: String = RatingValue::ALL
                .iter()
                .map(|value| {
                    format!(
                        r#"<button type="submit" name="rating_submit" value="{}">{}</button>"#,
                        i64::from(*value),
                        value.label()
                    )
                })
                .collect();
            format!(
                r#"<input type="hidden" name="rating" value="">
                <div class="actions">{buttons}</div>"#
            )
        }
        JudgmentKind::Click => r#"<input type="hidden" id="points" name="points" value="[]">
                <p class="meta">Click the image to mark problem regions. <span id="point-count">0</span> marked.
                <button type="button" id="clear-points">Clear</button></p>
                <div class="actions"><button type="submit">Submit</button></div>"#
            .to_string(),
    };

    format!(
        r#"<div id="qc-fragment" data-step="{slug}" data-image-id="{image_id}">
            {error}
            <img id="qc-image" class="qc-image" src="{src}" alt="{file1}">
            <p class="meta">{file1}</p>
            <form id="judgment-form" method="post" action="/rate/{slug}">
                {controls}
                <label><input type="checkbox" name="source_data_issue"> Source data issue</label>
                <div><textarea name="comments" rows="3" placeholder="Comments"></textarea></div>
            </form>
        </div>"#,
        slug = step.slug(),
        image_id = image.image_id,
        src = image.data_uri(),
        file1 = escape_html(&image.file1),
    )
}

pub fn rate_page(step: Step, image: &RenderedImage, error: Option<&str>) -> String {
    let body = format!(
        "        <h1>{}</h1>\n        {}",
        step,
        image_fragment(step, image, error)
    );

    let scripts = match step.judgment_kind() {
        JudgmentKind::Click => {
            r#"    <script src="/static/clicks.js"></script>
    <script src="/static/hotkeys.js"></script>"#
        }
        JudgmentKind::Rating => r#"    <script src="/static/hotkeys.js"></script>"#,
    };

    layout(&step.to_string(), &body, scripts)
}

/// Plain message page with a link back to the step chooser
pub fn message_page(title: &str, message: &str) -> String {
    let body = format!(
        r#"        <h1>{}</h1>
        <p>{}</p>
        <p><a href="/">Return to home</a></p>"#,
        escape_html(title),
        escape_html(message)
    );
    layout(title, &body, "")
}
