pub mod fake_transport;
