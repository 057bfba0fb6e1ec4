pub mod aggregate;
pub mod exec_expr;
pub mod exec_main;
pub mod join;
pub mod parallel;
pub mod scope;
pub mod view;
pub mod window;

#[cfg(test)]
mod exec_expr_tests;
#[cfg(test)]
mod view_tests;
