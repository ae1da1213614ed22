#![forbid(unsafe_code)]

mod lexer;
mod token;

pub use lexer::{LexError, Lexer};
pub use token::{Token, TokenKind};

#[cfg(test)]
mod tests {
	use super::*;

	fn kinds(src: &str) -> Vec<TokenKind> {
		Lexer::new(src)
			.lex()
			.unwrap()
			.into_iter()
			.map(|t| t.kind)
			.collect()
	}

	#[test]
	fn lex_number_literals() {
		let nums: Vec<f64> = kinds("1 2.5 0x1F 1e3")
			.into_iter()
			.filter_map(|k| match k {
				TokenKind::Number(n) => Some(n),
				_ => None,
			})
			.collect();
		assert_eq!(nums, vec![1.0, 2.5, 31.0, 1000.0]);
	}

	#[test]
	fn lex_keywords_win_over_identifiers() {
		let ks = kinds("function functional typeof x");
		assert_eq!(ks[0], TokenKind::KwFunction);
		assert_eq!(ks[1], TokenKind::Ident("functional".to_string()));
		assert_eq!(ks[2], TokenKind::KwTypeof);
	}

	#[test]
	fn lex_string_escapes() {
		let ks = kinds(r#"'it\'s' "a\nA""#);
		assert_eq!(ks[0], TokenKind::String("it's".to_string()));
		assert_eq!(ks[1], TokenKind::String("a\nA".to_string()));
	}

	#[test]
	fn lex_rejects_unknown_string_escape() {
		let err = Lexer::new("'\\q'").lex().unwrap_err();
		assert!(err.message.contains("invalid string literal"));
	}

	#[test]
	fn slash_after_operand_is_division() {
		let ks = kinds("a / b");
		assert_eq!(ks[1], TokenKind::Slash);
	}

	#[test]
	fn slash_in_operand_position_starts_regex() {
		let ks = kinds("x = /a[/]b/gi;");
		assert_eq!(
			ks[2],
			TokenKind::Regex {
				pattern: "a[/]b".to_string(),
				flags: "gi".to_string(),
			}
		);
		assert_eq!(ks[3], TokenKind::Semi);
	}

	#[test]
	fn comments_are_skipped_and_line_breaks_recorded() {
		let tokens = Lexer::new("a // one\n/* two\n */ b c").lex().unwrap();
		assert_eq!(tokens.len(), 4);
		assert!(!tokens[0].newline_before);
		assert!(tokens[1].newline_before);
		assert!(!tokens[2].newline_before);
	}
}
