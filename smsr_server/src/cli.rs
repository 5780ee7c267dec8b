use std::{env, env::VarError};

/// The server takes no arguments besides `-h`, `-V` and `--envs`. Returns true if one was handled and the process
/// should exit.
pub fn handle_command_line_args() -> bool {
    let Some(arg) = env::args().nth(1) else {
        return false;
    };
    match arg.as_str() {
        "-V" | "--version" => println!("smsr_server {}", env!("CARGO_PKG_VERSION")),
        "--envs" => display_envs(),
        _ => {
            display_readme();
            display_envs();
        },
    }
    true
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Be explicit about which envars to print, so as to avoid accidentally exposing secrets
    const DISPLAY_ENVS: [&str; 21] = [
        "RUST_LOG",
        "SMSR_HOST",
        "SMSR_PORT",
        "SMSR_DATABASE_URL",
        "SMSR_JWT_TTL_SECS",
        "SMSR_CARD_API_URL",
        "SMSR_BANK_API_URL",
        "SMSR_CRYPTO_API_URL",
        "SMSR_CRYPTO_MERCHANT_ID",
        "SMSR_PROVIDER_API_URL",
        "SMSR_PROVIDER_OPERATOR",
        "SMSR_FX_API_URL",
        "SMSR_LOCAL_CURRENCY",
        "SMSR_PRICE_MARKUP_BPS",
        "SMSR_ACTIVATION_LIFETIME_MINS",
        "SMSR_RESERVATION_TIMEOUT_MINS",
        "SMSR_HTTP_TIMEOUT_SECS",
        "SMSR_DEPOSIT_POLL_SECS",
        "SMSR_RESOURCE_POLL_SECS",
        "SMSR_FX_REFRESH_MINS",
        "SMSR_CALLBACK_URL",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
