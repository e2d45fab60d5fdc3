fn main() {
    // Embed git commit + build metadata, exposed through `iam::built_info`.
    if let Err(err) = built::write_built_file() {
        println!("cargo:warning=failed to acquire build-time information: {err}");
    }
}
