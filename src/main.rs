use std::io::{self, Write};
use std::process;
use std::sync::Arc;

use clap::{Arg, ArgMatches, Command};
use log::{error, warn};
use serde_json::json;

use session_auth::auth::password::read_password;
use session_auth::auth::{restrict_to, AuthSession, JsonFileUserStore, SignupRequest};
use session_auth::email::{ConsoleMailer, SmtpCredentials, SmtpMailer};
use session_auth::utils::logging::initialize_logging;
use session_auth::{
    AccountService, AuthConfig, AuthError, Mailer, Principal, Role, BEARER_PREFIX, USERS_FILE,
};

const DEFAULT_ORIGIN: &str = "http://127.0.0.1:3000";

type Service = AccountService<JsonFileUserStore>;

fn build_cli() -> Command {
    let email = || {
        Arg::new("email")
            .long("email")
            .help("Email address of the account")
            .value_name("EMAIL")
            .required(true)
    };
    let token = || {
        Arg::new("token")
            .long("token")
            .help("Session token returned by signup or login")
            .value_name("TOKEN")
            .required(true)
    };

    Command::new("session-auth")
        .about("Account signup, login and password lifecycle")
        .arg(
            Arg::new("store")
                .long("store")
                .help("Path of the JSON user store")
                .value_name("FILE")
                .default_value(USERS_FILE)
                .global(true),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("signup")
                .about("Create an account and start a session")
                .arg(email())
                .arg(
                    Arg::new("name")
                        .long("name")
                        .help("Display name")
                        .value_name("NAME"),
                ),
        )
        .subcommand(
            Command::new("login")
                .about("Log in with email and password")
                .arg(email()),
        )
        .subcommand(
            Command::new("whoami")
                .about("Show the account a session token belongs to")
                .arg(token()),
        )
        .subcommand(
            Command::new("forgot-password")
                .about("Send a password reset link")
                .arg(email())
                .arg(
                    Arg::new("origin")
                        .long("origin")
                        .help("Scheme and host used to build the reset link")
                        .value_name("URL")
                        .default_value(DEFAULT_ORIGIN),
                ),
        )
        .subcommand(
            Command::new("reset-password")
                .about("Set a new password with a reset token")
                .arg(
                    Arg::new("reset-token")
                        .help("Token from the reset link")
                        .required(true),
                ),
        )
        .subcommand(
            Command::new("update-password")
                .about("Change the password of a logged-in account")
                .arg(token()),
        )
        .subcommand(
            Command::new("check-role")
                .about("Check whether a session may perform a role-restricted action")
                .arg(token())
                .arg(
                    Arg::new("roles")
                        .long("roles")
                        .help("Comma-separated roles allowed to proceed")
                        .value_name("ROLES")
                        .value_delimiter(',')
                        .value_parser(clap::value_parser!(String))
                        .required(true),
                ),
        )
}

fn prompt_secret(label: &str) -> Result<String, AuthError> {
    print!("{}: ", label);
    io::stdout()
        .flush()
        .and_then(|_| read_password())
        .map_err(|e| AuthError::Validation(format!("Could not read {}: {}", label, e)))
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> &'a str {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .unwrap_or_default()
}

fn authenticate(service: &Service, matches: &ArgMatches) -> Result<Principal, AuthError> {
    let header = format!("{}{}", BEARER_PREFIX, required(matches, "token"));
    service.guard().authenticate(Some(header.as_str()))
}

fn mailer() -> Box<dyn Mailer> {
    match SmtpCredentials::from_env() {
        Some(creds) => Box::new(SmtpMailer::new(creds)),
        None => {
            warn!("SMTP_HOST, SMTP_USERNAME or SMTP_PASSWORD not set; reset emails are logged only");
            Box::new(ConsoleMailer)
        }
    }
}

fn print_session(service: &Service, session: &AuthSession) {
    println!("{:#}", session.response_body());
    println!(
        "Set-Cookie: {}",
        session.cookie(service.config(), service.now()).header_value()
    );
}

fn run(service: &Service, matches: &ArgMatches) -> Result<(), AuthError> {
    match matches.subcommand() {
        Some(("signup", sub_matches)) => {
            let password = prompt_secret("Password")?;
            let password_confirm = prompt_secret("Confirm password")?;
            let session = service.signup(SignupRequest {
                name: sub_matches.get_one::<String>("name").cloned(),
                email: required(sub_matches, "email").to_string(),
                password,
                password_confirm,
            })?;
            print_session(service, &session);
        }
        Some(("login", sub_matches)) => {
            let password = prompt_secret("Password")?;
            let session = service.login(required(sub_matches, "email"), &password)?;
            print_session(service, &session);
        }
        Some(("whoami", sub_matches)) => {
            let principal = authenticate(service, sub_matches)?;
            println!(
                "{:#}",
                json!({ "status": "success", "data": { "user": principal.to_public() } })
            );
        }
        Some(("forgot-password", sub_matches)) => {
            let mailer = mailer();
            service.request_password_reset(
                required(sub_matches, "email"),
                required(sub_matches, "origin"),
                mailer.as_ref(),
            )?;
            println!(
                "{:#}",
                json!({ "status": "success", "message": "Token sent to email!" })
            );
        }
        Some(("reset-password", sub_matches)) => {
            let password = prompt_secret("New password")?;
            let password_confirm = prompt_secret("Confirm new password")?;
            let session = service.reset_password(
                required(sub_matches, "reset-token"),
                &password,
                &password_confirm,
            )?;
            print_session(service, &session);
        }
        Some(("update-password", sub_matches)) => {
            let principal = authenticate(service, sub_matches)?;
            let current = prompt_secret("Current password")?;
            let password = prompt_secret("New password")?;
            let password_confirm = prompt_secret("Confirm new password")?;
            let session =
                service.update_password(&principal, &current, &password, &password_confirm)?;
            print_session(service, &session);
        }
        Some(("check-role", sub_matches)) => {
            let roles = sub_matches
                .get_many::<String>("roles")
                .into_iter()
                .flatten()
                .map(|r| r.parse::<Role>().map_err(AuthError::Validation))
                .collect::<Result<Vec<_>, _>>()?;
            let principal = authenticate(service, sub_matches)?;
            restrict_to(&roles).check(&principal)?;
            println!(
                "{:#}",
                json!({ "status": "success", "role": principal.role })
            );
        }
        _ => unreachable!("clap enforces a subcommand"),
    }
    Ok(())
}

fn main() {
    if let Err(e) = initialize_logging(None) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let matches = build_cli().get_matches();

    let config = match AuthConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(2);
        }
    };

    let store = match JsonFileUserStore::open(required(&matches, "store")) {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to open user store: {}", e);
            let err = AuthError::from(e);
            println!("{:#}", err.to_response_body());
            process::exit(1);
        }
    };

    let service = AccountService::new(Arc::new(store), Arc::new(config));

    if let Err(e) = run(&service, &matches) {
        if e.is_fault() {
            error!("Request failed: {:?}", e);
        }
        println!("{:#}", e.to_response_body());
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        build_cli().debug_assert();
    }

    #[test]
    fn test_check_role_parses_role_list() {
        let matches = build_cli()
            .try_get_matches_from([
                "session-auth",
                "check-role",
                "--token",
                "abc",
                "--roles",
                "admin,lead-guide",
            ])
            .unwrap();
        let (_, sub_matches) = matches.subcommand().unwrap();
        let roles: Vec<&String> = sub_matches.get_many::<String>("roles").unwrap().collect();
        assert_eq!(roles, ["admin", "lead-guide"]);
        assert_eq!(required(&matches, "store"), USERS_FILE);
    }
}
