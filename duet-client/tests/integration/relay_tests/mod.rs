mod test_relay_directory;
