use super::StructuringError;

/// Placeholder replaced by the extracted document text.
pub const CONTENT_PLACEHOLDER: &str = "pdf_content";

/// Placeholder replaced by the JSON schema.
pub const SCHEMA_PLACEHOLDER: &str = "schema";

/// Fill a stored prompt template.
///
/// Templates use `{name}` placeholders; `{{` and `}}` stand for literal
/// braces. Only `{pdf_content}` and `{schema}` are known, any other name
/// is an error rather than being sent to the model unfilled.
pub fn render_prompt(
    template: &str,
    pdf_content: &str,
    schema: &str,
) -> Result<String, StructuringError> {
    let mut out = String::with_capacity(template.len() + pdf_content.len() + schema.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for n in chars.by_ref() {
                    if n == '}' {
                        closed = true;
                        break;
                    }
                    name.push(n);
                }
                if !closed {
                    return Err(StructuringError::PromptTemplate(format!(
                        "unclosed placeholder '{{{name}'"
                    )));
                }
                match name.trim() {
                    CONTENT_PLACEHOLDER => out.push_str(pdf_content),
                    SCHEMA_PLACEHOLDER => out.push_str(schema),
                    other => {
                        return Err(StructuringError::PromptTemplate(format!(
                            "unknown placeholder '{{{other}}}'"
                        )))
                    }
                }
            }
            '}' => {
                return Err(StructuringError::PromptTemplate(
                    "single '}' in template; use '}}' for a literal brace".into(),
                ))
            }
            _ => out.push(c),
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_both_placeholders() {
        let prompt = render_prompt(
            "Extrae {schema} del texto:\n{pdf_content}",
            "Total: $50",
            r#"{"total":"number"}"#,
        )
        .unwrap();
        assert_eq!(prompt, "Extrae {\"total\":\"number\"} del texto:\nTotal: $50");
    }

    #[test]
    fn doubled_braces_are_literal() {
        let prompt = render_prompt("Return {{\"a\": 1}} for {pdf_content}", "x", "s").unwrap();
        assert_eq!(prompt, "Return {\"a\": 1} for x");
    }

    #[test]
    fn substituted_values_are_not_reparsed() {
        let prompt = render_prompt("{pdf_content}", "{schema} stays", "S").unwrap();
        assert_eq!(prompt, "{schema} stays");
    }

    #[test]
    fn placeholder_may_repeat() {
        let prompt = render_prompt("{schema}|{schema}", "", "S").unwrap();
        assert_eq!(prompt, "S|S");
    }

    #[test]
    fn unknown_placeholder_rejected() {
        let err = render_prompt("Hello {name}", "x", "s").unwrap_err();
        assert!(matches!(err, StructuringError::PromptTemplate(_)));
    }

    #[test]
    fn unclosed_placeholder_rejected() {
        assert!(render_prompt("Hello {pdf_content", "x", "s").is_err());
    }

    #[test]
    fn stray_closing_brace_rejected() {
        assert!(render_prompt("oops } here", "x", "s").is_err());
    }
}
