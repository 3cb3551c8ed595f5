//! Depth-first traversal driving the visitor protocol.
//!
//! The walker linearizes the tree into visitor callbacks. Grouping is
//! decided here and only here: a term is `nested` when the source had
//! explicit parentheses or when precedence requires them (an `or` child
//! under `and`, the operand of `not`, an additive child under a
//! multiplicative operator). Visitors render what they are told.

use tiller_core::Value;

use crate::ast::{BinaryOp, Expr};

/// Callbacks invoked by [`walk`].
///
/// Terms delimit conditions and grouped sub-expressions; functions wrap
/// their arguments, where the first argument is an operand and any
/// following argument is a predicate.
pub trait Visitor {
    type Error;

    fn start_term(&mut self, nested: bool) -> Result<(), Self::Error>;
    fn end_term(&mut self, nested: bool) -> Result<(), Self::Error>;
    fn start_function(&mut self, name: &str) -> Result<(), Self::Error>;
    fn end_function(&mut self, name: &str) -> Result<(), Self::Error>;
    fn visit_and(&mut self) -> Result<(), Self::Error>;
    fn visit_or(&mut self) -> Result<(), Self::Error>;
    fn visit_not(&mut self) -> Result<(), Self::Error>;
    fn visit_operator(&mut self, op: BinaryOp) -> Result<(), Self::Error>;
    fn visit_literal(&mut self, value: &Value) -> Result<(), Self::Error>;
    fn visit_ident(&mut self, path: &[String]) -> Result<(), Self::Error>;
    fn visit_ident_array(&mut self, paths: &[Vec<String>]) -> Result<(), Self::Error>;
}

/// Walk an expression depth-first, driving the visitor.
pub fn walk<V: Visitor>(expr: &Expr, visitor: &mut V) -> Result<(), V::Error> {
    walk_condition(expr, visitor, false)
}

fn walk_condition<V: Visitor>(expr: &Expr, v: &mut V, nested: bool) -> Result<(), V::Error> {
    match expr {
        Expr::Group(inner) => walk_condition(inner, v, true),

        Expr::And(lhs, rhs) => {
            if nested {
                v.start_term(true)?;
            }
            walk_condition(lhs, v, matches!(lhs.as_ref(), Expr::Or(_, _)))?;
            v.visit_and()?;
            walk_condition(rhs, v, matches!(rhs.as_ref(), Expr::Or(_, _)))?;
            if nested {
                v.end_term(true)?;
            }
            Ok(())
        }

        Expr::Or(lhs, rhs) => {
            if nested {
                v.start_term(true)?;
            }
            walk_condition(lhs, v, false)?;
            v.visit_or()?;
            walk_condition(rhs, v, false)?;
            if nested {
                v.end_term(true)?;
            }
            Ok(())
        }

        Expr::Not(inner) => {
            v.visit_not()?;
            walk_condition(inner, v, true)
        }

        Expr::Binary { op, lhs, rhs } if op.is_comparison() => {
            v.start_term(nested)?;
            walk_operand(lhs, v, 0)?;
            v.visit_operator(*op)?;
            walk_operand(rhs, v, 0)?;
            v.end_term(nested)
        }

        // A bare operand in condition position: a boolean field or a
        // context flag standing alone as a condition.
        other => {
            v.start_term(nested)?;
            walk_operand(other, v, 0)?;
            v.end_term(nested)
        }
    }
}

fn walk_operand<V: Visitor>(expr: &Expr, v: &mut V, parent_prec: u8) -> Result<(), V::Error> {
    match expr {
        Expr::Ident(path) => v.visit_ident(path),

        Expr::Literal(value) => v.visit_literal(value),

        Expr::Array(items) => {
            let all_idents = !items.is_empty()
                && items.iter().all(|item| matches!(item, Expr::Ident(_)));
            if all_idents {
                let paths: Vec<Vec<String>> = items
                    .iter()
                    .filter_map(|item| match item {
                        Expr::Ident(path) => Some(path.clone()),
                        _ => None,
                    })
                    .collect();
                v.visit_ident_array(&paths)
            } else {
                // Array elements are literal values; anything else has no
                // literal rendering and collapses to null.
                let values: Vec<Value> = items
                    .iter()
                    .map(|item| match item {
                        Expr::Literal(value) => value.clone(),
                        _ => Value::Null,
                    })
                    .collect();
                v.visit_literal(&Value::List(values))
            }
        }

        Expr::Function { name, args } => {
            v.start_function(name)?;
            for (index, arg) in args.iter().enumerate() {
                if index == 0 {
                    walk_operand(arg, v, 0)?;
                } else {
                    walk_condition(arg, v, false)?;
                }
            }
            v.end_function(name)
        }

        Expr::Binary { op, lhs, rhs } => {
            let prec = arithmetic_precedence(*op);
            let nested = prec < parent_prec;
            v.start_term(nested)?;
            walk_operand(lhs, v, prec)?;
            v.visit_operator(*op)?;
            // Left associativity: an equal-precedence right child keeps
            // its grouping, e.g. a - (b - c).
            walk_operand(rhs, v, prec + 1)?;
            v.end_term(nested)
        }

        Expr::Group(inner) => {
            v.start_term(true)?;
            walk_operand(inner, v, 0)?;
            v.end_term(true)
        }

        // A boolean sub-expression in operand position.
        other => walk_condition(other, v, true),
    }
}

fn arithmetic_precedence(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Multiply | BinaryOp::Divide => 2,
        BinaryOp::Add | BinaryOp::Subtract => 1,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expression;
    use pretty_assertions::assert_eq;

    /// Records callbacks as a flat event log.
    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl Visitor for Recorder {
        type Error = std::convert::Infallible;

        fn start_term(&mut self, nested: bool) -> Result<(), Self::Error> {
            self.events.push(format!("start({})", nested));
            Ok(())
        }
        fn end_term(&mut self, nested: bool) -> Result<(), Self::Error> {
            self.events.push(format!("end({})", nested));
            Ok(())
        }
        fn start_function(&mut self, name: &str) -> Result<(), Self::Error> {
            self.events.push(format!("fn:{}", name));
            Ok(())
        }
        fn end_function(&mut self, name: &str) -> Result<(), Self::Error> {
            self.events.push(format!("endfn:{}", name));
            Ok(())
        }
        fn visit_and(&mut self) -> Result<(), Self::Error> {
            self.events.push("and".to_string());
            Ok(())
        }
        fn visit_or(&mut self) -> Result<(), Self::Error> {
            self.events.push("or".to_string());
            Ok(())
        }
        fn visit_not(&mut self) -> Result<(), Self::Error> {
            self.events.push("not".to_string());
            Ok(())
        }
        fn visit_operator(&mut self, op: BinaryOp) -> Result<(), Self::Error> {
            self.events.push(format!("op:{:?}", op));
            Ok(())
        }
        fn visit_literal(&mut self, value: &Value) -> Result<(), Self::Error> {
            self.events.push(format!("lit:{:?}", value));
            Ok(())
        }
        fn visit_ident(&mut self, path: &[String]) -> Result<(), Self::Error> {
            self.events.push(format!("ident:{}", path.join(".")));
            Ok(())
        }
        fn visit_ident_array(&mut self, paths: &[Vec<String>]) -> Result<(), Self::Error> {
            self.events.push(format!("idents:{}", paths.len()));
            Ok(())
        }
    }

    fn events(source: &str) -> Vec<String> {
        let expr = parse_expression(source).unwrap();
        let mut recorder = Recorder::default();
        walk(&expr, &mut recorder).unwrap();
        recorder.events
    }

    #[test]
    fn walk_flat_and_chain_has_no_nesting() {
        assert_eq!(
            events("a == 1 and b == 2"),
            vec![
                "start(false)",
                "ident:a",
                "op:Equals",
                "lit:Int(1)",
                "end(false)",
                "and",
                "start(false)",
                "ident:b",
                "op:Equals",
                "lit:Int(2)",
                "end(false)",
            ]
        );
    }

    #[test]
    fn walk_groups_or_under_and() {
        let log = events("(a == 1 or b == 2) and c == 3");
        assert_eq!(log[0], "start(true)");
        assert!(log.contains(&"or".to_string()));
        let close = log.iter().position(|e| e == "end(true)").unwrap();
        assert!(log[close + 1] == "and");
    }

    #[test]
    fn walk_not_nests_its_operand() {
        let log = events("!a");
        assert_eq!(
            log,
            vec!["not", "start(true)", "ident:a", "end(true)"]
        );
    }

    #[test]
    fn walk_arithmetic_nests_by_precedence() {
        // (a + b) * c keeps its parentheses; a + b * c does not need any.
        let log = events("(a + 1) * 2 == 6");
        assert!(log.contains(&"start(true)".to_string()));

        let log = events("a + 1 * 2 == 6");
        assert!(!log.contains(&"start(true)".to_string()));
    }

    #[test]
    fn walk_function_args() {
        let log = events("sumIf(order.items.price, order.items.paid == true) > 100");
        assert_eq!(log[0], "start(false)");
        assert_eq!(log[1], "fn:sumIf");
        assert_eq!(log[2], "ident:order.items.price");
        // The predicate argument arrives as its own term.
        assert_eq!(log[3], "start(false)");
        assert!(log.contains(&"endfn:sumIf".to_string()));
    }

    #[test]
    fn walk_ident_array() {
        let log = events("thing.owner in [ctx.identity.id]");
        assert!(log.contains(&"idents:1".to_string()));
    }
}
