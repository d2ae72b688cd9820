mod test_connection_lifecycle;
