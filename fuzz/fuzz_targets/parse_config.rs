#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let data = if data.len() > 64 * 1024 {
        &data[..64 * 1024]
    } else {
        data
    };

    if let Ok(t) = ftpd_listener::Tunables::from_json(data) {
        assert!(t.line_buffer_bytes > 0);
        let _ = ftpd_listener::ListenMode::from_tunables(&t);
    }
});
