mod test_incoming_session;
mod test_outgoing_session;
