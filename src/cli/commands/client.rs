use super::arg_id;
use clap::{Arg, Command};

pub const ARG_DESCRIPTION: &str = "description";
pub const ARG_REDIRECT_URI: &str = "redirect-uri";

#[must_use]
pub fn command() -> Command {
    Command::new("client")
        .about("Manage OAuth2 clients")
        .subcommand_required(true)
        .subcommand(
            Command::new("create")
                .about("Register a client and print its secret once")
                .arg(
                    Arg::new(ARG_DESCRIPTION)
                        .long("description")
                        .help("Human readable name")
                        .required(true),
                )
                .arg(
                    Arg::new(ARG_REDIRECT_URI)
                        .long("redirect-uri")
                        .help("Absolute URI the browser returns to with the code")
                        .required(true),
                ),
        )
        .subcommand(Command::new("list").about("List clients"))
        .subcommand(
            Command::new("delete")
                .about("Delete a client")
                .arg(arg_id("Client id")),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_create_requires_redirect_uri() {
        let result = command().try_get_matches_from(vec!["client", "create", "--description", "x"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_delete_parses_id() {
        let id = Uuid::new_v4();
        let matches = command().get_matches_from(vec![
            "client".to_string(),
            "delete".to_string(),
            id.to_string(),
        ]);
        let (_, delete) = matches.subcommand().unwrap();
        assert_eq!(delete.get_one::<Uuid>(crate::cli::commands::ARG_ID), Some(&id));
    }
}
