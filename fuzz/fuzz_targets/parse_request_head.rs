#![no_main]
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use digest_parse::{find_head_end, parse_request_head};

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }
    let bytes = Bytes::copy_from_slice(data);
    let _ = find_head_end(&bytes);
    let _ = parse_request_head(&bytes);
});
