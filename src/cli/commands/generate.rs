use super::serve::ARG_PRIVATE_KEY;
use clap::{Arg, Command};

#[must_use]
pub fn command() -> Command {
    Command::new("generate")
        .about("Generate secrets and keys")
        .subcommand_required(true)
        .subcommand(
            Command::new("secret").about("Random client secret and its Argon2id PHC string"),
        )
        .subcommand(Command::new("private-key").about("P-256 private key (PKCS#8 PEM)"))
        .subcommand(
            Command::new("public-key")
                .about("Public key (SPKI PEM) that verifies id tokens signed by a private key")
                .arg(
                    Arg::new(ARG_PRIVATE_KEY)
                        .long("private-key")
                        .help("Private key PEM file, read from stdin when omitted")
                        .env("ONEGATE_PRIVATE_KEY"),
                ),
        )
        .subcommand(
            Command::new("key").about("32 random bytes, base64, for --session-key or --url-login-key"),
        )
}
