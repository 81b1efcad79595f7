#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use revmount::modules::mount_table::{table_contains, unescape_field};
use revmount::HostPath;

#[derive(Arbitrary, Debug)]
struct Input {
    host_path: String,
    table: String,
}

fuzz_target!(|input: Input| {
    if let Ok(host) = HostPath::normalize(&input.host_path) {
        // Normalizing twice must not change the path
        let again = HostPath::normalize(host.as_str()).unwrap();
        assert_eq!(host, again);

        // A mount point written the way the kernel escapes it is always found
        let escaped = host
            .as_str()
            .replace('\\', "\\134")
            .replace(' ', "\\040")
            .replace('\t', "\\011")
            .replace('\n', "\\012");
        if !escaped.chars().any(char::is_whitespace) {
            let line = format!("endpoint {} fuse.sshfs rw 0 0\n", escaped);
            assert!(table_contains(&line, &host));
        }

        let _ = table_contains(&input.table, &host);
    }

    for field in input.table.split_whitespace() {
        let _ = unescape_field(field);
    }
});
