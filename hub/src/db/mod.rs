pub mod executor;
pub mod pool;
pub mod query;
pub mod schema;

#[cfg(test)]
pub(crate) mod test_support;
