pub mod power_payload;
