pub mod constants;
pub mod content_type;

#[cfg(test)]
pub mod test_helpers;
