pub mod engine;

#[cfg(test)]
mod property_tests;
