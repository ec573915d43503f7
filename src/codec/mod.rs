mod request_decoder;
pub use request_decoder::RequestDecoder;

mod response_encoder;
pub use response_encoder::connection_value;
pub use response_encoder::encode_prelude;
pub use response_encoder::CONTINUE_PRELUDE;
