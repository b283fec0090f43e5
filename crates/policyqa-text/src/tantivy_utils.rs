use std::str::SplitWhitespace;

use tantivy::tokenizer::{LowerCaser, TextAnalyzer, Token, TokenStream, Tokenizer};

/// Splits on any Unicode whitespace (NBSP, em space, ...), unlike tantivy's
/// `WhitespaceTokenizer` which only knows ASCII blanks.
#[derive(Clone, Default)]
pub struct UnicodeWhitespaceTokenizer {
	token: Token,
}

pub struct UnicodeWhitespaceTokenStream<'a> {
	text: &'a str,
	words: SplitWhitespace<'a>,
	token: &'a mut Token,
}

impl Tokenizer for UnicodeWhitespaceTokenizer {
	type TokenStream<'a> = UnicodeWhitespaceTokenStream<'a>;

	fn token_stream<'a>(&'a mut self, text: &'a str) -> UnicodeWhitespaceTokenStream<'a> {
		self.token = Token::default();
		UnicodeWhitespaceTokenStream { text, words: text.split_whitespace(), token: &mut self.token }
	}
}

impl TokenStream for UnicodeWhitespaceTokenStream<'_> {
	fn advance(&mut self) -> bool {
		let Some(word) = self.words.next() else { return false };
		// `word` is a subslice of `text`
		let offset = word.as_ptr() as usize - self.text.as_ptr() as usize;
		self.token.text.clear();
		self.token.text.push_str(word);
		self.token.offset_from = offset;
		self.token.offset_to = offset + word.len();
		self.token.position = self.token.position.wrapping_add(1);
		true
	}

	fn token(&self) -> &Token { self.token }

	fn token_mut(&mut self) -> &mut Token { self.token }
}

/// Lower-cases and splits on whitespace. No stemming and no stop words: the
/// lexical engine is kept naive so it complements the semantic one.
pub fn build_analyzer() -> TextAnalyzer {
	TextAnalyzer::builder(UnicodeWhitespaceTokenizer::default())
		.filter(LowerCaser)
		.build()
}

pub fn tokenize(analyzer: &mut TextAnalyzer, text: &str) -> Vec<String> {
	let mut stream = analyzer.token_stream(text);
	let mut tokens = Vec::new();
	while stream.advance() {
		tokens.push(stream.token().text.clone());
	}
	tokens
}
