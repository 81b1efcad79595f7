#![no_main]
use libfuzzer_sys::fuzz_target;
use revmount::modules::command::{client_command, server_command};
use revmount::MountConfig;

fuzz_target!(|data: &[u8]| {
    if let Ok(config_str) = std::str::from_utf8(data) {
        if let Ok(config) = serde_json::from_str::<MountConfig>(config_str) {
            if let Ok(request) = config.to_request() {
                // Building commands is deterministic for any valid request
                let a = client_command(&request, "/guest", &config.tools);
                let b = client_command(&request, "/guest", &config.tools);
                assert_eq!(a.to_shell_string(), b.to_shell_string());
                assert_eq!(a.args[1], request.host_path().as_str());
                let _ = server_command(&request, &config.tools).to_shell_string();
            }
        }
    }
});
