fn main() {
    // Embed the UTC build timestamp; --version prints it next to the
    // package version.
    println!("cargo:rustc-env=CV_BUILD_TIME={}", time_now_utc());
}

/// UTC timestamp via the `date` binary, avoiding a chrono dependency in
/// the build script.
fn time_now_utc() -> String {
    use std::process::Command;
    let output = Command::new("date")
        .args(["-u", "+%Y-%m-%dT%H:%M:%SZ"])
        .output()
        .expect("failed to run `date` command");
    String::from_utf8(output.stdout)
        .expect("invalid UTF-8 from date")
        .trim()
        .to_string()
}
