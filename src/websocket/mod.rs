pub mod wallet_events;
