//! Recursive-descent parser (spec.md §4.1). Never fails: malformed input
//! degrades to a smaller tree or `None`, which the calculator maps to the
//! empty CQR.

use super::ast::{Node, NodeBase, OpKind};
use super::tokenizer::{Token, TokenKind, Tokenizer};

/// Balances parentheses ahead of tokenization (spec.md §4.1): an unmatched
/// `)` is dropped, unmatched `(`s get synthetic closers appended at the
/// end. Runs once, before any tokens are produced.
pub fn repair_parens(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 4);
    let mut depth: i32 = 0;
    for c in input.chars() {
        match c {
            '(' => {
                depth += 1;
                out.push(c);
            }
            ')' => {
                if depth > 0 {
                    depth -= 1;
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }
    for _ in 0..depth {
        out.push(')');
    }
    out
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Parse a full query string into an operator tree. `None` means an empty
/// or entirely uninterpretable query (spec.md §4.1: "never fails").
pub fn parse(input: &str) -> Option<Box<Node>> {
    let repaired = repair_parens(input);
    let mut parser = Parser::new(&repaired);
    parser.parse_q()
}

struct Parser<'a> {
    tokenizer: Tokenizer<'a>,
    lookahead: Token<'a>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        let mut tokenizer = Tokenizer::new(input);
        let lookahead = tokenizer.next_token();
        Self { tokenizer, lookahead }
    }

    fn advance(&mut self) -> Token<'a> {
        std::mem::replace(&mut self.lookahead, self.tokenizer.next_token())
    }

    /// `Q := SingleQ ((SET_OP | BETWEEN | ε) SingleQ)*` — a run of operands
    /// joined by explicit operators, or by nothing at all (implicit
    /// intersection, spec.md §4.1's "`Q Q`" rule).
    fn parse_q(&mut self) -> Option<Box<Node>> {
        let mut left = self.parse_single_q()?;

        loop {
            match self.lookahead.kind {
                TokenKind::Eof | TokenKind::RParen => break,
                TokenKind::Op(OpKind::SetOp) => {
                    let glyph = self.advance().text.to_string();
                    match self.parse_single_q() {
                        Some(right) => left = Node::binary(OpKind::SetOp, glyph, left, right),
                        None => break,
                    }
                }
                TokenKind::Op(OpKind::Between) => {
                    self.advance();
                    match self.parse_single_q() {
                        Some(right) => left = Node::binary(OpKind::Between, "<->", left, right),
                        None => break,
                    }
                }
                TokenKind::Invalid => {
                    self.advance();
                }
                _ => match self.parse_single_q() {
                    Some(right) => left = Node::binary(OpKind::SetOp, " ", left, right),
                    None => break,
                },
            }
        }

        Some(left)
    }

    /// `SingleQ := '(' Q ')' | UNARY SingleQ | LEAF`.
    fn parse_single_q(&mut self) -> Option<Box<Node>> {
        match self.lookahead.kind {
            TokenKind::Eof | TokenKind::RParen => None,
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_q();
                if self.lookahead.kind == TokenKind::RParen {
                    self.advance();
                }
                inner
            }
            TokenKind::Invalid => {
                log::debug!("skipping unrecognised token {:?}", self.lookahead.text);
                self.advance();
                self.parse_single_q()
            }
            TokenKind::Op(op) => match op.base() {
                NodeBase::Leaf => self.parse_leaf(op),
                NodeBase::Unary => self.parse_unary(op),
                NodeBase::Binary => {
                    // A binary operator with no left operand at this
                    // position can't be attached to anything; drop it.
                    log::debug!("dropping binary operator with no left operand");
                    self.advance();
                    self.parse_single_q()
                }
            },
        }
    }

    fn parse_leaf(&mut self, op: OpKind) -> Option<Box<Node>> {
        let token = self.advance();
        let value = match op {
            OpKind::String | OpKind::StringItem | OpKind::StringRegion => unescape(token.text),
            _ => token.text.to_string(),
        };
        Some(Node::leaf(op, value))
    }

    fn parse_unary(&mut self, op: OpKind) -> Option<Box<Node>> {
        let token = self.advance();
        let value = token.text.to_string();
        match self.parse_single_q() {
            Some(operand) => Some(Node::unary(op, value, operand)),
            None => {
                log::debug!("unary operator with no operand, discarding");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repair_parens_appends_missing_closers() {
        assert_eq!(repair_parens("((a"), "((a))");
    }

    #[test]
    fn repair_parens_drops_unmatched_closer() {
        assert_eq!(repair_parens("a)"), "a");
    }

    #[test]
    fn empty_query_parses_to_none() {
        assert!(parse("").is_none());
    }

    #[test]
    fn single_word_is_a_string_leaf() {
        let node = parse("hotel").unwrap();
        assert_eq!(node.base, NodeBase::Leaf);
        assert_eq!(node.op, OpKind::String);
        assert_eq!(node.value, "hotel");
    }

    #[test]
    fn adjacent_leaves_form_implicit_intersection() {
        let node = parse("hotel restaurant").unwrap();
        assert_eq!(node.op, OpKind::SetOp);
        assert_eq!(node.children.len(), 2);
        assert_eq!(node.children[0].value, "hotel");
        assert_eq!(node.children[1].value, "restaurant");
    }

    #[test]
    fn explicit_union_builds_binary_node() {
        let node = parse("hotel + restaurant").unwrap();
        assert_eq!(node.op, OpKind::SetOp);
        assert_eq!(node.value, "+");
    }

    #[test]
    fn trailing_binary_operator_is_discarded() {
        let node = parse("hotel +").unwrap();
        assert_eq!(node.op, OpKind::String);
        assert_eq!(node.value, "hotel");
    }

    #[test]
    fn unary_with_no_operand_yields_none() {
        assert!(parse("%5%").is_none());
    }

    #[test]
    fn cell_dilation_wraps_its_operand() {
        let node = parse("%5% hotel").unwrap();
        assert_eq!(node.op, OpKind::CellDilation);
        assert_eq!(node.value, "5");
        assert_eq!(node.children[0].value, "hotel");
    }

    #[test]
    fn parenthesised_subquery_is_unwrapped() {
        let node = parse("(hotel + restaurant) cafe").unwrap();
        assert_eq!(node.op, OpKind::SetOp);
        assert_eq!(node.value, " ");
        assert_eq!(node.children[0].op, OpKind::SetOp);
        assert_eq!(node.children[0].value, "+");
    }

    #[test]
    fn between_operator_builds_binary_node() {
        let node = parse("hotel <-> restaurant").unwrap();
        assert_eq!(node.op, OpKind::Between);
    }

    #[test]
    fn qec_leaf_keeps_min_max_payload() {
        let node = parse("$qec:1:1 $region:42").unwrap();
        assert_eq!(node.op, OpKind::QueryExclusiveCells);
        assert_eq!(node.value, "1:1");
        assert_eq!(node.children[0].op, OpKind::Region);
        assert_eq!(node.children[0].value, "42");
    }
}
