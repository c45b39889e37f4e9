fn main() {
    let mut host = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("LTV {}", ltv::VERSION);
                return;
            }
            "--help" | "-h" => {
                println!(
                    "LTV — Browse Lemmy communities from the terminal.\n\nUsage: ltv [HOST]\n\n  HOST                 Lemmy instance to browse (default: {})\n  --version, -V        Show version and exit\n  --help,    -h        Show this help message",
                    ltv::lemmy::DEFAULT_INSTANCE
                );
                return;
            }
            _ => {}
        }
        if host.is_some() || arg.starts_with('-') {
            eprintln!("error: unexpected argument '{arg}'\n\nUsage: ltv [HOST]");
            std::process::exit(1);
        }
        host = Some(arg);
    }

    if let Err(err) = ltv::run(ltv::RunOptions { host }) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}
