//! Binance USDT-M Futures exchange gateway: REST client with rate gating,
//! retries and caching; HMAC request signing; and the trade-stream WebSocket
//! client, wired onto `fleet_core::ExchangeGateway`.

pub mod client;
pub mod gateway;
pub mod signing;
pub mod websocket;

pub use client::BinanceClient;
pub use gateway::BinanceGateway;
pub use websocket::{BinanceTradeStream, LatestPriceCache, Trade};
