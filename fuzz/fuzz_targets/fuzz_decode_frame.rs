#![no_main]

use bytes::{Buf, BytesMut};
use nebula_wire::protocol::decode_frame;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut buf = BytesMut::from(data);

    // Several frames may arrive in a single TCP segment.
    loop {
        if buf.is_empty() {
            break;
        }
        match decode_frame(&buf) {
            Ok(Some((_, consumed))) => {
                if consumed == 0 {
                    break;
                }
                buf.advance(consumed);
            }
            Ok(None) | Err(_) => break,
        }
    }
});
