// src/expr.rs

//! Generic infix-expression compiler.
//!
//! Turns a token stream into a postfix trace and a binary syntax tree using
//! the classic two-stack operator-precedence construction. The compiler has
//! no knowledge of documents or predicates; callers provide the operator
//! symbols and their precedence table.

use std::collections::HashMap;
use std::fmt;

use crate::error::{AppError, Result};

/// Opening group symbol.
pub const OPEN: &str = "(";
/// Closing group symbol.
pub const CLOSE: &str = ")";

/// Operator associativity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assoc {
    Left,
    Right,
}

/// Precedence entry for one operator.
#[derive(Debug, Clone, Copy)]
pub struct Precedence {
    pub value: u8,
    pub assoc: Assoc,
}

impl Precedence {
    pub fn left(value: u8) -> Self {
        Self {
            value,
            assoc: Assoc::Left,
        }
    }

    pub fn right(value: u8) -> Self {
        Self {
            value,
            assoc: Assoc::Right,
        }
    }
}

/// Binary syntax tree: leaves hold raw operand strings, branches hold an
/// operator symbol and exactly two children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxTree {
    Leaf(String),
    Branch {
        op: String,
        left: Box<SyntaxTree>,
        right: Box<SyntaxTree>,
    },
}

impl SyntaxTree {
    pub fn is_leaf(&self) -> bool {
        matches!(self, SyntaxTree::Leaf(_))
    }

    /// The leaf operand or operator symbol at this node.
    pub fn value(&self) -> &str {
        match self {
            SyntaxTree::Leaf(value) => value,
            SyntaxTree::Branch { op, .. } => op,
        }
    }

    fn render(&self, depth: usize, out: &mut String) {
        let indent = "  ".repeat(depth + 1);
        out.push_str(&format!("---- '{}'", self.value()));
        if let SyntaxTree::Branch { left, right, .. } = self {
            out.push_str(&format!("\n{indent}|"));
            left.render(depth + 1, out);
            out.push_str(&format!("\n{indent}|"));
            right.render(depth + 1, out);
        }
    }
}

impl fmt::Display for SyntaxTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.render(0, &mut out);
        write!(f, "{out}")
    }
}

/// Compilation output: the postfix trace and the syntax tree.
#[derive(Debug, Clone)]
pub struct Compiled {
    pub postfix: String,
    pub tree: SyntaxTree,
}

/// Operator-precedence compiler for a fixed symbol set.
pub struct ExprCompiler {
    symbols: Vec<String>,
    precedence: HashMap<String, Precedence>,
}

impl ExprCompiler {
    /// Create a compiler for the given operator symbols and precedence
    /// table. The group symbols `(` and `)` are recognized implicitly when
    /// present in `symbols`.
    pub fn new(symbols: &[&str], precedence: HashMap<String, Precedence>) -> Self {
        Self {
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            precedence,
        }
    }

    fn is_group(token: &str) -> bool {
        token == OPEN || token == CLOSE
    }

    fn precedence_of(&self, op: &str) -> Result<Precedence> {
        self.precedence
            .get(op)
            .copied()
            .ok_or_else(|| AppError::syntax(format!("no precedence defined for operator '{op}'")))
    }

    /// Compile a token stream into a postfix trace and a syntax tree.
    pub fn compile(&self, tokens: &[String]) -> Result<Compiled> {
        let mut operators: Vec<String> = Vec::new();
        let mut nodes: Vec<SyntaxTree> = Vec::new();
        let mut postfix = String::new();
        let mut running = String::new();

        // Last few characters of the consumed input, for error messages.
        let near = |running: &str| {
            let chars: Vec<char> = running.chars().collect();
            let start = chars.len().saturating_sub(10);
            chars[start..].iter().collect::<String>()
        };
        let reduce = |op: String, nodes: &mut Vec<SyntaxTree>, running: &str| -> Result<()> {
            let right = nodes
                .pop()
                .ok_or_else(|| AppError::syntax(format!("invalid expression near ..{}", near(running))))?;
            let left = nodes
                .pop()
                .ok_or_else(|| AppError::syntax(format!("invalid expression near ..{}", near(running))))?;
            nodes.push(SyntaxTree::Branch {
                op,
                left: Box::new(left),
                right: Box::new(right),
            });
            Ok(())
        };

        for token in tokens {
            running.push_str(token);
            if self.symbols.iter().any(|s| s == token) {
                if token == OPEN {
                    operators.push(token.clone());
                } else if token == CLOSE {
                    loop {
                        let top = operators.pop().ok_or_else(|| {
                            AppError::syntax(format!("invalid expression near ..{}", near(&running)))
                        })?;
                        if top == OPEN {
                            break;
                        }
                        postfix.push_str(&top);
                        reduce(top, &mut nodes, &running)?;
                    }
                } else {
                    let token_prec = self.precedence_of(token)?;
                    while let Some(top) = operators.last().cloned() {
                        if Self::is_group(&top) {
                            break;
                        }
                        let top_prec = self.precedence_of(&top)?;
                        let should_pop = token_prec.value < top_prec.value
                            || (token_prec.value == top_prec.value
                                && top_prec.assoc == Assoc::Left);
                        if !should_pop {
                            break;
                        }
                        operators.pop();
                        postfix.push_str(&top);
                        reduce(top, &mut nodes, &running)?;
                    }
                    operators.push(token.clone());
                }
            } else {
                postfix.push_str(token);
                nodes.push(SyntaxTree::Leaf(token.clone()));
            }
        }

        if operators.iter().any(|op| Self::is_group(op)) {
            return Err(AppError::syntax("unbalanced grouping symbol"));
        }

        while let Some(top) = operators.pop() {
            postfix.push_str(&top);
            reduce(top, &mut nodes, &running)?;
        }

        if nodes.len() != 1 {
            return Err(AppError::syntax("reduction failed"));
        }

        Ok(Compiled {
            postfix,
            tree: nodes.remove(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arithmetic() -> ExprCompiler {
        let precedence = HashMap::from([
            ("+".to_string(), Precedence::left(1)),
            ("-".to_string(), Precedence::left(1)),
            ("*".to_string(), Precedence::left(2)),
            ("/".to_string(), Precedence::left(2)),
            ("^".to_string(), Precedence::right(3)),
        ]);
        ExprCompiler::new(&["(", ")", "+", "-", "*", "/", "^"], precedence)
    }

    fn chars(expr: &str) -> Vec<String> {
        expr.chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| c.to_string())
            .collect()
    }

    #[test]
    fn postfix_matches_reference() {
        let compiled = arithmetic()
            .compile(&chars("3 + 4 * 2 / (1 - 5) ^ 2 ^ 3"))
            .unwrap();
        assert_eq!(compiled.postfix, "342*15-23^^/+");
    }

    #[test]
    fn redundant_parenthesization_builds_same_tree() {
        let compiler = arithmetic();
        let a = compiler.compile(&chars("x+h+y*z/q")).unwrap();
        let b = compiler.compile(&chars("x+h+(y*z)/q")).unwrap();
        assert_eq!(a.tree, b.tree);
    }

    #[test]
    fn equal_precedence_associates_left() {
        let compiled = arithmetic().compile(&chars("a-b-c")).unwrap();
        // (a - b) - c
        match &compiled.tree {
            SyntaxTree::Branch { op, left, .. } => {
                assert_eq!(op, "-");
                assert!(!left.is_leaf());
            }
            _ => panic!("expected a branch"),
        }
    }

    #[test]
    fn right_associative_chains_right() {
        let compiled = arithmetic().compile(&chars("a^b^c")).unwrap();
        // a ^ (b ^ c)
        match &compiled.tree {
            SyntaxTree::Branch { op, right, .. } => {
                assert_eq!(op, "^");
                assert!(!right.is_leaf());
            }
            _ => panic!("expected a branch"),
        }
    }

    #[test]
    fn unmatched_open_parenthesis_fails() {
        assert!(arithmetic().compile(&chars("(a+b")).is_err());
    }

    #[test]
    fn unmatched_close_parenthesis_fails() {
        assert!(arithmetic().compile(&chars("a+b)")).is_err());
    }

    #[test]
    fn dangling_operator_fails() {
        assert!(arithmetic().compile(&chars("a+")).is_err());
    }

    #[test]
    fn adjacent_operands_fail_reduction() {
        let tokens = vec!["a".to_string(), "b".to_string()];
        assert!(arithmetic().compile(&tokens).is_err());
    }

    #[test]
    fn single_leaf_compiles() {
        let compiled = arithmetic().compile(&chars("x")).unwrap();
        assert_eq!(compiled.tree, SyntaxTree::Leaf("x".to_string()));
        assert_eq!(compiled.postfix, "x");
    }
}
