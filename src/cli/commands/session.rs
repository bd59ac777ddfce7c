use clap::{Arg, ArgAction, Command};

pub const ARG_ACTIVE_SECONDS: &str = "active-seconds";
pub const ARG_SOFT_DELETE: &str = "soft-delete";
pub const ARG_DELETED: &str = "deleted";
pub const ARG_INACTIVE: &str = "inactive";
pub const ARG_DRY_RUN: &str = "dry-run";

#[must_use]
pub fn command() -> Command {
    Command::new("session")
        .about("Inspect and clean up browser sessions")
        .subcommand_required(true)
        .arg(
            Arg::new(ARG_ACTIVE_SECONDS)
                .long("active-seconds")
                .help("A session is active if it was used within this many seconds")
                .env("ONEGATE_SESSION_ACTIVE_SECONDS")
                .default_value("7200")
                .global(true)
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .subcommand(Command::new("list").about("List sessions"))
        .subcommand(
            Command::new("delete-all")
                .about("Delete sessions")
                .arg(
                    Arg::new(ARG_SOFT_DELETE)
                        .long("soft-delete")
                        .help("Mark sessions deleted instead of removing them")
                        .action(ArgAction::SetTrue)
                        .conflicts_with(ARG_DELETED),
                )
                .arg(
                    Arg::new(ARG_DELETED)
                        .long("deleted")
                        .help("Only remove sessions that were soft-deleted")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new(ARG_INACTIVE)
                        .long("inactive")
                        .help("Only touch sessions outside the active window")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new(ARG_DRY_RUN)
                        .long("dry-run")
                        .help("Print the statement instead of running it")
                        .action(ArgAction::SetTrue),
                ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soft_delete_conflicts_with_deleted() {
        let result = command().try_get_matches_from(vec![
            "session",
            "delete-all",
            "--soft-delete",
            "--deleted",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_active_seconds_global() {
        temp_env::with_vars([("ONEGATE_SESSION_ACTIVE_SECONDS", None::<&str>)], || {
            let matches = command().get_matches_from(vec![
                "session",
                "delete-all",
                "--inactive",
                "--active-seconds",
                "60",
            ]);
            let (_, delete) = matches.subcommand().unwrap();
            assert_eq!(delete.get_one::<i64>(ARG_ACTIVE_SECONDS).copied(), Some(60));
            assert!(delete.get_flag(ARG_INACTIVE));
            assert!(!delete.get_flag(ARG_SOFT_DELETE));
        });
    }
}
