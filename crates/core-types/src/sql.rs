//! Lexical scanning of stored query text.

#[derive(Clone, Copy, PartialEq, Eq)]
enum Scan {
    Code,
    Quoted(char),
    LineComment,
    BlockComment,
}

/// Pairs every character of `sql` with whether it is SQL code.
///
/// Single-quoted literals, double-quoted and backtick-quoted identifiers,
/// `--` line comments and `/* */` block comments are not code. A doubled
/// quote inside a literal closes and reopens it, which yields the same mask.
pub fn code_mask(sql: &str) -> Vec<(char, bool)> {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = Vec::with_capacity(chars.len());
    let mut state = Scan::Code;
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        let next = chars.get(i + 1).copied();
        match state {
            Scan::Code => match (ch, next) {
                ('\'' | '"' | '`', _) => {
                    state = Scan::Quoted(ch);
                    out.push((ch, false));
                }
                ('-', Some('-')) => {
                    state = Scan::LineComment;
                    out.extend([(ch, false), ('-', false)]);
                    i += 2;
                    continue;
                }
                ('/', Some('*')) => {
                    state = Scan::BlockComment;
                    out.extend([(ch, false), ('*', false)]);
                    i += 2;
                    continue;
                }
                _ => out.push((ch, true)),
            },
            Scan::Quoted(quote) => {
                out.push((ch, false));
                if ch == quote {
                    state = Scan::Code;
                }
            }
            Scan::LineComment if ch == '\n' => {
                out.push((ch, true));
                state = Scan::Code;
            }
            Scan::LineComment => out.push((ch, false)),
            Scan::BlockComment => {
                if ch == '*' && next == Some('/') {
                    out.extend([(ch, false), ('/', false)]);
                    state = Scan::Code;
                    i += 2;
                    continue;
                }
                out.push((ch, false));
            }
        }
        i += 1;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(sql: &str) -> String {
        code_mask(sql)
            .into_iter()
            .map(|(ch, is_code)| if is_code { ch } else { '_' })
            .collect()
    }

    #[test]
    fn quoted_text_and_comments_are_masked() {
        assert_eq!(code("a = 'x?' AND b = ?"), "a = ____ AND b = ?");
        assert_eq!(code(r#"SELECT "why?" FROM t"#), "SELECT ______ FROM t");
        assert_eq!(code("SELECT `a?b` FROM t"), "SELECT _____ FROM t");
        assert_eq!(code("x -- really?\ny = ?"), "x __________\ny = ?");
        assert_eq!(code("x /* ? */ = ?"), "x _______ = ?");
        assert_eq!(code("note = 'it''s?'"), "note = ________");
    }

    #[test]
    fn unterminated_regions_run_to_the_end() {
        assert_eq!(code("a = ? /* open"), "a = ? _______");
        assert_eq!(code("a = 'open ?"), "a = _______");
    }
}
