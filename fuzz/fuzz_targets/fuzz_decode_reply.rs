#![no_main]

use bytes::Bytes;
use nebula_wire::protocol::decode::{decode_binary_result, decode_execution_response};
use nebula_wire::protocol::decode_reply;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let payload = Bytes::copy_from_slice(data);

    let _ = decode_reply(
        payload.clone(),
        "executeWithParameter",
        1,
        decode_execution_response,
    );
    let _ = decode_reply(payload, "executeJsonWithParameter", 1, decode_binary_result);
});
