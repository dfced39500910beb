use serde_json::Value;

/// Build a copy-pasteable curl command reproducing an inbound request.
/// `body` must already be redacted; the original body never reaches this
/// function. Non-JSON and empty bodies produce no `-d` clause.
pub fn build(
    method: &str,
    headers: &[(String, String)],
    url: &str,
    body: Option<&Value>,
) -> String {
    let mut lines = vec![format!("curl -s -X {}", method.to_ascii_uppercase())];

    for (name, value) in headers {
        if !value.is_empty() {
            lines.push(format!("-H \"{}: {}\"", name, escape_double_quoted(value)));
        }
    }

    lines.push(format!("\"{}\"", url));

    if let Some(body) = body {
        lines.push(format!("-d '{}'", body));
    }

    format!("{} --compressed", lines.join(" \\\n"))
}

fn escape_double_quoted(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
