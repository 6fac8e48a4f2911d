//! CLI argument parsing module
//!
//! This module handles command-line argument parsing and application entry point.

use crate::config::{ClientConfig, ProxyConfig};
use crate::error::Result;
use crate::exit_code::{exit_code_for_error, HTTP_FAILURE};
use crate::http::{Client, RegexMatch, RequestBuilder, Response};
use crate::output::OutputWriter;
use crate::utils::{FileUtils, StringUtils};
use clap::{Arg, ArgAction, ArgMatches, Command};
use log::warn;

/// Main entry point for the CLI application
pub fn run() {
    let matches = create_app().get_matches();
    crate::logging::init(matches.get_flag("verbose"));

    match run_with_args(&matches) {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("scrapechain: error: {}", e);
            std::process::exit(exit_code_for_error(&e));
        }
    }
}

/// Run scrapechain with parsed command line arguments, returning the exit code
fn run_with_args(matches: &ArgMatches) -> Result<i32> {
    let client = Client::with_config(build_config_from_args(matches)?)?;
    let request = build_request(&client, matches)?;
    let response = request.dispatch()?;

    let mut failed = false;
    response.on_http_error(|_, _, err| {
        warn!("{}", err);
        failed = true;
    });

    if let Some(output_file) = matches.get_one::<String>("output") {
        response.save_to(FileUtils::expand_path(output_file)?)?;
    }

    write_results(&response, matches)?;

    if failed && matches.get_flag("fail") {
        return Ok(HTTP_FAILURE);
    }
    Ok(0)
}

/// Create the CLI application structure
fn create_app() -> Command {
    Command::new("scrapechain")
        .version(crate::VERSION)
        .about("Fetch a page through a cookie session and query it")
        .arg(Arg::new("url")
            .help("The URL to request")
            .required(true)
            .index(1))
        .arg(Arg::new("request")
            .short('X')
            .long("request")
            .value_name("METHOD")
            .help("HTTP request method")
            .default_value("GET"))
        .arg(Arg::new("header")
            .short('H')
            .long("header")
            .value_name("HEADER")
            .help("Add custom HTTP header")
            .action(ArgAction::Append))
        .arg(Arg::new("raw-headers")
            .long("raw-headers")
            .value_name("FILE")
            .help("Read headers from a raw dump (e.g. copied from browser devtools)"))
        .arg(Arg::new("cookie")
            .short('b')
            .long("cookie")
            .value_name("NAME=VALUE; ...")
            .help("Add cookies to the session")
            .action(ArgAction::Append))
        .arg(Arg::new("param")
            .short('G')
            .long("param")
            .value_name("KEY=VALUE&...")
            .help("Add query parameters")
            .action(ArgAction::Append))
        .arg(Arg::new("user-agent")
            .short('A')
            .long("user-agent")
            .value_name("STRING")
            .env("SCRAPECHAIN_USER_AGENT")
            .help("User-Agent header"))
        .arg(Arg::new("timeout")
            .long("timeout")
            .value_name("SECONDS")
            .help("Maximum time for operation")
            .default_value("300"))
        .arg(Arg::new("connect-timeout")
            .long("connect-timeout")
            .value_name("SECONDS")
            .help("Maximum time for connection")
            .default_value("30"))
        .arg(Arg::new("proxy")
            .short('x')
            .long("proxy")
            .value_name("[PROTOCOL://]HOST[:PORT]")
            .help("Use proxy server"))
        .arg(Arg::new("insecure")
            .short('k')
            .long("insecure")
            .help("Allow insecure SSL connections")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("cacert")
            .long("cacert")
            .value_name("FILE")
            .help("CA certificate bundle file"))
        .arg(Arg::new("no-location")
            .long("no-location")
            .help("Do not follow redirects")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("output")
            .short('o')
            .long("output")
            .value_name("FILE")
            .help("Save the raw response body to a file"))
        .arg(Arg::new("include")
            .short('i')
            .long("include")
            .help("Print the status line and response headers")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("select")
            .long("select")
            .value_name("CSS")
            .help("Print the first element matching a CSS selector"))
        .arg(Arg::new("all")
            .long("all")
            .help("With --select, print every matching element")
            .requires("select")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("regex")
            .long("regex")
            .value_name("PATTERN")
            .help("Print every match of a regular expression in the body"))
        .arg(Arg::new("json")
            .long("json")
            .help("Parse the body as JSON and pretty-print it")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("json-scripts")
            .long("json-scripts")
            .help("Print JSON values found in inline scripts")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("application-json")
            .long("application-json")
            .help("With --json-scripts, only read <script type=\"application/json\">")
            .requires("json-scripts")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("scripts")
            .long("scripts")
            .help("Print the URLs of external scripts")
            .action(ArgAction::SetTrue))
        .group(clap::ArgGroup::new("query")
            .args(["select", "regex", "json", "json-scripts", "scripts"]))
        .arg(Arg::new("fail")
            .short('f')
            .long("fail")
            .help("Exit with code 22 on HTTP errors")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("verbose")
            .short('v')
            .long("verbose")
            .help("Verbose logging")
            .action(ArgAction::SetTrue))
}

/// Build configuration from command line arguments
fn build_config_from_args(matches: &ArgMatches) -> Result<ClientConfig> {
    let mut config = ClientConfig::default();

    if let Some(user_agent) = matches.get_one::<String>("user-agent") {
        config.user_agent = Some(user_agent.clone());
    }

    if let Some(timeout_str) = matches.get_one::<String>("timeout") {
        config.timeout = StringUtils::parse_timeout(timeout_str)?;
    }

    if let Some(connect_timeout_str) = matches.get_one::<String>("connect-timeout") {
        config.connect_timeout = StringUtils::parse_timeout(connect_timeout_str)?;
    }

    if let Some(proxy) = matches.get_one::<String>("proxy") {
        config.proxy = Some(ProxyConfig {
            url: proxy.clone(),
            username: None,
            password: None,
        });
    }

    config.follow_redirects = !matches.get_flag("no-location");
    config.ssl.verify_certs = !matches.get_flag("insecure");

    if let Some(cacert_file) = matches.get_one::<String>("cacert") {
        config.ssl.ca_cert_file = Some(FileUtils::expand_path(cacert_file)?);
    }

    Ok(config)
}

/// Walk the client → auth → request chain from the parsed arguments
fn build_request(client: &Client, matches: &ArgMatches) -> Result<RequestBuilder> {
    let url = matches.get_one::<String>("url").map(String::as_str).unwrap_or_default();
    let method = matches.get_one::<String>("request").map(String::as_str).unwrap_or("GET");

    let mut request = match matches.get_many::<String>("cookie") {
        Some(cookies) => {
            let auth = client.auth(url, method, None)?;
            let mut request = None;
            for cookie in cookies {
                request = Some(auth.cookie(cookie.as_str())?);
            }
            match request {
                Some(request) => request,
                None => client.no_auth(url, method)?,
            }
        }
        None => client.no_auth(url, method)?,
    };

    if let Some(raw_file) = matches.get_one::<String>("raw-headers") {
        let raw = std::fs::read_to_string(FileUtils::expand_path(raw_file)?)?;
        request.set_custom_headers_from_raw(&raw)?;
    }

    if let Some(headers) = matches.get_many::<String>("header") {
        for header_str in headers {
            let (key, value) = StringUtils::parse_header(header_str)?;
            request.set_custom_header(&key, value)?;
        }
    }

    if let Some(params) = matches.get_many::<String>("param") {
        for params_str in params {
            request.set_query_params(params_str.as_str())?;
        }
    }

    Ok(request)
}

fn write_results(response: &Response, matches: &ArgMatches) -> Result<()> {
    let mut writer = OutputWriter::stdout(matches.get_flag("include"));

    if let Some(selector) = matches.get_one::<String>("select") {
        let elements = response
            .find_element(selector, matches.get_flag("all"))?
            .into_vec();
        return writer.write_lines(elements.iter().map(|element| element.html()));
    }

    if let Some(pattern) = matches.get_one::<String>("regex") {
        let found = response.match_regex(pattern, true)?;
        return writer.write_lines(found.iter().map(format_match));
    }

    if matches.get_flag("json") {
        let value = response.to_json()?;
        return writer.write_lines([serde_json::to_string_pretty(&value)?]);
    }

    if matches.get_flag("json-scripts") {
        let values = response.find_json_objects(matches.get_flag("application-json"))?;
        return writer.write_lines(values.map(|value| value.to_string()));
    }

    if matches.get_flag("scripts") {
        let requests = response.external_script_requests();
        return writer.write_lines(requests.iter().map(|request| request.view().url.to_string()));
    }

    writer.write_body(response.status(), response.headers(), response.text())
}

/// Whole match, or its capture groups separated by tabs
fn format_match(found: &RegexMatch) -> String {
    if found.groups.is_empty() {
        return found.matched.clone();
    }
    found
        .groups
        .iter()
        .map(|group| group.as_deref().unwrap_or(""))
        .collect::<Vec<_>>()
        .join("\t")
}
