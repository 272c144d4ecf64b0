pub mod ast;
pub mod autodiff;
pub mod diag;
pub mod ir;
pub mod lower;

#[cfg(test)]
#[path = "tests/helpers.rs"]
pub(crate) mod test_helpers;
