//! Server-rendered pages. Pure functions of the session state.

use html_escape::encode_text;
use pulldown_cmark::{html, Options, Parser};

use crate::session::{Notice, NoticeKind, Page, SessionState};

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; background-color: #f0f2f6; margin: 0; padding: 2rem; color: #222; }
h1 { margin-top: 0; }
.columns { display: flex; gap: 2rem; align-items: flex-start; }
.report-card { flex: 1.5; background-color: #ffffff; padding: 25px; border-radius: 15px; box-shadow: 0 4px 12px rgba(0,0,0,0.1); border-top: 5px solid #007bff; }
.chat-box { flex: 1; border: 2px solid #007bff; border-radius: 15px; background-color: #ffffff; padding: 15px; box-shadow: 0 4px 10px rgba(0,0,0,0.1); }
.chat-log { height: 400px; overflow-y: auto; margin-bottom: 1rem; }
.msg { padding: 0.5rem 0.75rem; border-radius: 8px; margin-bottom: 0.5rem; }
.msg.user { background: #e8f0fe; }
.msg.assistant { background: #f6f6f6; }
.notice { padding: 0.75rem 1rem; border-radius: 6px; margin: 1rem 0; }
.notice.success { background: #d4edda; border: 1px solid #c3e6cb; }
.notice.error { background: #f8d7da; border: 1px solid #f5c6cb; }
.header { display: flex; justify-content: space-between; align-items: center; }
.disclaimer-box { font-size: 13px; color: #555; background-color: #fff3cd; padding: 15px; border-radius: 5px; text-align: center; border: 1px solid #ffeeba; margin-top: 30px; }
"#;

const DISCLAIMER: &str = "⚠️ <b>Disclaimer:</b> I am an AI. My answers are based only on the provided document \
and may not reflect your real-world situation. This tool is for educational purposes only and does not \
substitute for real-world legal advice.";

/// Markdown from the model, as sanitized HTML
pub fn markdown_to_html(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH);
    let mut out = String::new();
    html::push_html(&mut out, parser);
    ammonia::clean(&out)
}

/// Render whichever page the session is on
pub fn render_page(session: &SessionState, notice: Option<&Notice>) -> String {
    let body = match session.current_page {
        Page::Upload => upload_page(session),
        Page::Results => results_page(session),
    };
    let notice = notice.map(notice_html).unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Legalize AI</title>
<style>{style}</style>
</head>
<body>
{notice}
{body}
<div class="disclaimer-box">{disclaimer}</div>
</body>
</html>"#,
        style = STYLE,
        notice = notice,
        body = body,
        disclaimer = DISCLAIMER,
    )
}

fn notice_html(notice: &Notice) -> String {
    let class = match notice.kind {
        NoticeKind::Success => "success",
        NoticeKind::Error => "error",
    };
    format!(r#"<div class="notice {}">{}</div>"#, class, encode_text(&notice.text))
}

fn upload_page(session: &SessionState) -> String {
    let mut html = String::from(
        r#"<h1>⚖️ Legalize AI: Smart Contract Auditor</h1>
<h3>Step 1: Upload Your Document 📝</h3>
<form method="post" action="/analyze" enctype="multipart/form-data">
<input type="file" name="file" accept="application/pdf,.pdf" required>
<button type="submit">🚀 Analyze Contract Now</button>
</form>"#,
    );

    // Navigation only once an analysis exists
    if session.has_analysis() {
        html.push_str(
            r#"
<div class="notice success">Analysis complete! Click below to see the results.</div>
<form method="post" action="/report"><button type="submit">➡️ View Full Audit Report</button></form>"#,
        );
    }
    html
}

fn results_page(session: &SessionState) -> String {
    let source = session.document.as_ref().map(|doc| {
        let mut line = format!("{} · {} page(s)", encode_text(&doc.file_name), doc.page_count);
        if doc.truncated {
            line.push_str(" · long document, only the beginning was analyzed");
        }
        format!("<p><small>{}</small></p>", line)
    }).unwrap_or_default();

    let messages: String = session.messages.iter()
        .map(|m| format!(
            r#"<div class="msg {}">{}</div>"#,
            m.role.as_str(),
            markdown_to_html(&m.content)
        ))
        .collect();

    format!(
        r#"<div class="header">
<h1>⚖️ Audit Results &amp; AI Assistant</h1>
<form method="post" action="/new-upload"><button type="submit">🏠 New Upload</button></form>
</div>
<div class="columns">
<div class="report-card">
<h3>📊 Document Analysis Report</h3>
{source}
{report}
</div>
<div class="chat-box">
<h3>💬 Chat with Document</h3>
<div class="chat-log">{messages}</div>
<form method="post" action="/chat">
<input type="text" name="question" placeholder="Ask a specific question..." required autocomplete="off">
<button type="submit">Send</button>
</form>
</div>
</div>"#,
        source = source,
        report = markdown_to_html(&session.analysis_result),
        messages = messages,
    )
}
