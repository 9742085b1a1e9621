//! Evaluation of the narrow constant-expression grammar.

use crate::ast::ConstExpr;
use crate::error::DeclarationError;

pub(crate) fn eval_const(expr: &ConstExpr) -> Result<i64, DeclarationError> {
    match expr {
        ConstExpr::Int { value, .. } => Ok(*value),
        ConstExpr::Neg { inner, line } => {
            let value = eval_const(inner)?;
            value
                .checked_neg()
                .ok_or(DeclarationError::IntegerOutOfRange { line: *line })
        }
        // names of other constants are not looked up; layouts must never
        // depend on registration order
        ConstExpr::Ident { line, .. } => {
            Err(DeclarationError::NonConstantExpression { line: *line })
        }
    }
}

pub(crate) fn eval_array_length(expr: &ConstExpr) -> Result<u64, DeclarationError> {
    let value = eval_const(expr)?;
    u64::try_from(value).map_err(|_| DeclarationError::IntegerOutOfRange {
        line: line_of(expr),
    })
}

pub(crate) fn eval_bit_size(expr: &ConstExpr) -> Result<u32, DeclarationError> {
    let value = eval_const(expr)?;
    u32::try_from(value).map_err(|_| DeclarationError::IntegerOutOfRange {
        line: line_of(expr),
    })
}

fn line_of(expr: &ConstExpr) -> u32 {
    match expr {
        ConstExpr::Int { line, .. }
        | ConstExpr::Neg { line, .. }
        | ConstExpr::Ident { line, .. } => *line,
    }
}
