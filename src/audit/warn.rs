fn sanitize_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_sep = false;
    for ch in value.chars() {
        if ch.is_ascii_whitespace() {
            if !out.is_empty() && !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else if ch.is_ascii_graphic() {
            out.push(ch);
            prev_sep = false;
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "na".to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn format_warning(
    code: &str,
    stage: &str,
    identity: &str,
    source: &str,
    path: &str,
    reason: &str,
) -> String {
    format!(
        "AUDIT_WARN code={} stage={} identity={} source={} path={} reason={}",
        sanitize_value(code),
        sanitize_value(stage),
        sanitize_value(identity),
        sanitize_value(source),
        sanitize_value(path),
        sanitize_value(reason),
    )
}

pub fn emit(code: &str, stage: &str, identity: &str, source: &str, path: &str, reason: &str) {
    eprintln!(
        "{}",
        format_warning(code, stage, identity, source, path, reason)
    );
}

#[cfg(test)]
mod tests {
    use super::{format_warning, sanitize_value};

    #[test]
    fn sanitize_value_rewrites_whitespace() {
        assert_eq!(sanitize_value("a b\tc"), "a_b_c");
    }

    #[test]
    fn sanitize_value_falls_back_for_empty() {
        assert_eq!(sanitize_value("   "), "na");
    }

    #[test]
    fn warning_line_is_single_line_key_value() {
        let line = format_warning(
            "OPAQUE_VALUE",
            "normalize",
            "evt 1",
            "live",
            "metadata.odd",
            "unrecognized envelope\npassed through",
        );
        assert_eq!(
            line,
            "AUDIT_WARN code=OPAQUE_VALUE stage=normalize identity=evt_1 source=live path=metadata.odd reason=unrecognized_envelope_passed_through"
        );
    }
}
