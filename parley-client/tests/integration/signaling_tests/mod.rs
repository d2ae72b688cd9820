mod test_correlation;
mod test_self_addressing;
mod test_welcome;
