pub mod test_peer_leave_cleans_up;
pub mod test_two_peers_reach_open;
