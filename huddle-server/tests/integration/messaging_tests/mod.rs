pub mod test_broadcast_reaches_all;
pub mod test_file_transfer_roundtrip;
