fn main() {
    #[cfg(feature = "cli")]
    fwpatch::cli::run();

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("fwpatch: CLI not enabled. Rebuild with `--features cli`.");
        std::process::exit(1);
    }
}
