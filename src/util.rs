//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// Literal JSON braces in prompts survive because only known keys are replaced.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Extract a JSON value from a model reply.
///
/// Models wrap JSON in markdown fences or add chatter around it, so:
/// 1) strip a leading ``` / ```json fence and a trailing fence,
/// 2) try to parse the whole text,
/// 3) otherwise parse the outermost `{ ... }` span.
pub fn parse_ai_json(text: &str) -> Option<serde_json::Value> {
  let mut body = text.trim();
  if let Some(rest) = body.strip_prefix("```") {
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    body = rest.trim_start();
    if let Some(inner) = body.trim_end().strip_suffix("```") {
      body = inner.trim_end();
    }
  }

  if let Ok(v) = serde_json::from_str::<serde_json::Value>(body) {
    return Some(v);
  }

  let start = body.find('{')?;
  let end = body.rfind('}')?;
  if end <= start {
    return None;
  }
  serde_json::from_str::<serde_json::Value>(&body[start..=end]).ok()
}

/// Minimal HTML text escaping for rendered worksheet markup.
pub fn escape_html(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  for ch in s.chars() {
    match ch {
      '&' => out.push_str("&amp;"),
      '<' => out.push_str("&lt;"),
      '>' => out.push_str("&gt;"),
      '"' => out.push_str("&quot;"),
      '\'' => out.push_str("&#39;"),
      _ => out.push(ch),
    }
  }
  out
}

/// Log-safe truncation for large strings, char-boundary aware.
/// Avoids spamming logs with whole questions or model replies.
pub fn trunc_for_log(s: &str, max_chars: usize) -> String {
  let count = s.chars().count();
  if count <= max_chars {
    s.to_string()
  } else {
    format!("{}… ({} chars total)", s.chars().take(max_chars).collect::<String>(), count)
  }
}
