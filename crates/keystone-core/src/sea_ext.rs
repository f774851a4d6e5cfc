use sea_orm::sea_query::{Expr, Func, IntoColumnRef, LikeExpr, SimpleExpr};

/// Escape `LIKE` wildcards (`%`, `_`) and the escape character itself so the
/// input matches literally. Pair with `ESCAPE '\'`.
pub fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// `LOWER(col) = lower(value)`.
pub fn lower_eq<C: IntoColumnRef>(col: C, value: &str) -> SimpleExpr {
    Expr::expr(Func::lower(Expr::col(col))).eq(value.to_lowercase())
}

/// `LOWER(col) LIKE '%term%' ESCAPE '\'` with `term` lowercased and escaped.
pub fn lower_contains<C: IntoColumnRef>(col: C, term: &str) -> SimpleExpr {
    let pattern = format!("%{}%", escape_like(&term.to_lowercase()));
    Expr::expr(Func::lower(Expr::col(col))).like(LikeExpr::new(pattern).escape('\\'))
}
