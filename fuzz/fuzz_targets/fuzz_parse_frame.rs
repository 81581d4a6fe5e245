#![no_main]

use libfuzzer_sys::fuzz_target;
use mbus_serial::{decode_complete, decode_progress, parse_frame, FrameProgress};

fuzz_target!(|data: &[u8]| {
    // The parser must handle any malformed input gracefully
    let _ = parse_frame(data);

    // Walk the input the way the receive loop does: never read past what
    // the decoder asks for.
    let mut len = 0;
    loop {
        match decode_progress(&data[..len]) {
            FrameProgress::NeedMore(n) => {
                assert!(n > 0);
                if len + n > data.len() {
                    break;
                }
                len += n;
            }
            FrameProgress::Complete => {
                // a frame the incremental check accepts must decode in full
                assert!(decode_complete(&data[..len]).is_ok());
                break;
            }
            FrameProgress::Malformed => {
                assert!(decode_complete(&data[..len]).is_err());
                break;
            }
        }
    }

    // Corrupting the checksum of a long frame must be caught
    if data.len() > 10 && data[0] == 0x68 {
        let mut corrupted = data.to_vec();
        if let Some(last) = corrupted.len().checked_sub(2).map(|i| &mut corrupted[i]) {
            *last = last.wrapping_add(1);
            let _ = decode_complete(&corrupted);
        }
    }
});
