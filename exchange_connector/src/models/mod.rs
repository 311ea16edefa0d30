pub mod candle;
pub mod market;
pub mod order_book;
pub mod timeframe;
