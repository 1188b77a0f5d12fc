#[macro_use]
extern crate clap;
#[macro_use]
extern crate failure;
extern crate log;

use std::env;
use std::fs::File;
use std::path::{Path, PathBuf};

use clap::ArgMatches;
use failure::Error;
use indexmap::IndexMap;
use log::info;

use sync::{documentation_path, MirrorUploader, Platform, SftpConfig, TestServer};
use sync::server::DEFAULT_TESTING_DIRECTORY;

const CUSTOM_DIRECTORY_VARIABLE: &str = "JAVADOC_UPLOAD_CUSTOM_DIRECTORY_PATH";

fn app() -> clap::App<'static, 'static> {
    let app = clap_app!(artifact_sync =>
        (version: crate_version!())
        (author: crate_authors!())
        (about: crate_description!())
        (@setting SubcommandRequiredElseHelp)
        (@subcommand install =>
            (about: "Installs the latest server build of a version, reusing a cached binary")
            (@arg platform: --platform +takes_value default_value[paper] "The server platform")
            (@arg dir: --dir +takes_value "The server directory, instead of the testing directory layout")
            (@arg testing_dir: --testing +takes_value "The testing directory [default: test-environment]")
            (@arg force: --force "Download the latest build even if a binary is already present")
            (@arg version: +required "The minecraft version to install")
        )
        (@subcommand prepare =>
            (about: "Installs a server and sets it up to load the given plugin")
            (@arg platform: --platform +takes_value default_value[paper] "The server platform")
            (@arg dir: --dir +takes_value "The server directory, instead of the testing directory layout")
            (@arg testing_dir: --testing +takes_value "The testing directory [default: test-environment]")
            (@arg force: --force "Download the latest build even if a binary is already present")
            (@arg plugin: --plugin +takes_value +required "The plugin jar to test")
            (@arg property: -D --property +takes_value +multiple number_of_values(1) "A server.properties entry as key=value")
            (@arg version: +required "The minecraft version to prepare")
        )
        (@subcommand run =>
            (about: "Prepares a server and runs it in the foreground")
            (@arg platform: --platform +takes_value default_value[paper] "The server platform")
            (@arg dir: --dir +takes_value "The server directory, instead of the testing directory layout")
            (@arg testing_dir: --testing +takes_value "The testing directory [default: test-environment]")
            (@arg force: --force "Download the latest build even if a binary is already present")
            (@arg plugin: --plugin +takes_value +required "The plugin jar to test")
            (@arg property: -D --property +takes_value +multiple number_of_values(1) "A server.properties entry as key=value")
            (@arg jvm_arg: --jvm +takes_value +multiple number_of_values(1) +allow_hyphen_values "An argument for the JVM")
            (@arg java: --java +takes_value default_value[java] "The java executable")
            (@arg version: +required "The minecraft version to run")
        )
        (@subcommand mirror =>
            (about: "Replaces a remote SFTP directory with the contents of a local one")
            (@arg config: --config +takes_value "A JSON file with the SFTP settings, instead of JAVADOC_* variables")
            (@arg root_path: --root +takes_value "The remote directory all paths are relative to")
            (@arg local_dir: +required "The local directory to upload")
            (@arg segments: +multiple "The remote path below the root directory")
        )
    );
    // Subcommand names in the macro can't contain dashes
    let upload_docs = clap_app!(@subcommand upload_docs =>
        (about: "Uploads generated documentation to the documentation server")
        (@arg config: --config +takes_value "A JSON file with the SFTP settings, instead of JAVADOC_* variables")
        (@arg root_path: --root +takes_value "The remote directory all paths are relative to")
        (@arg root_project: --("root-project") +takes_value +required "The name of the root project")
        (@arg project: --project +takes_value "The name of the subproject, if any")
        (@arg custom_path: --("custom-path") +takes_value env(CUSTOM_DIRECTORY_VARIABLE)
            "A custom directory replacing the root project name")
        (@arg local_dir: +required "The generated documentation")
    ).name("upload-docs");
    app.subcommand(upload_docs)
}

fn main() -> Result<(), Error> {
    ::env_logger::init();
    let matches = app().get_matches();
    match matches.subcommand() {
        ("install", Some(matches)) => {
            let server = test_server(matches)?;
            let installer = server.platform.installer();
            let jar = installer.install(&server.version, &server.directory, matches.is_present("force"))?;
            println!("{}", jar.display());
        },
        ("prepare", Some(matches)) => {
            let server = test_server(matches)?;
            let plugin = PathBuf::from(matches.value_of("plugin").unwrap());
            let prepared = server.prepare(&plugin, matches.is_present("force"))?;
            println!("{}", prepared.server_jar.display());
        },
        ("run", Some(matches)) => {
            let mut server = test_server(matches)?;
            if let Some(jvm_args) = matches.values_of("jvm_arg") {
                server.jvm_args = jvm_args.map(String::from).collect();
            }
            let plugin = PathBuf::from(matches.value_of("plugin").unwrap());
            let prepared = server.prepare(&plugin, matches.is_present("force"))?;
            info!("Starting {} {} in {}", server.platform, server.version, prepared.directory.display());
            let status = prepared.command(matches.value_of("java").unwrap()).status()?;
            if !status.success() {
                bail!("Server exited with {}", status);
            }
        },
        ("mirror", Some(matches)) => {
            let uploader = MirrorUploader::new(sftp_config(matches)?);
            let segments: Vec<&str> = matches.values_of("segments")
                .map(|values| values.collect())
                .unwrap_or_default();
            uploader.mirror(Path::new(matches.value_of("local_dir").unwrap()), &segments)?;
        },
        ("upload-docs", Some(matches)) => {
            let uploader = MirrorUploader::new(sftp_config(matches)?);
            uploader.mirror(Path::new(matches.value_of("local_dir").unwrap()), &docs_path(matches))?;
        },
        _ => unreachable!(),
    }
    Ok(())
}

fn test_server(matches: &ArgMatches) -> Result<TestServer, Error> {
    let platform = value_t!(matches, "platform", Platform)
        .unwrap_or_else(|e| e.exit());
    let version = matches.value_of("version").unwrap();
    let mut server = match matches.value_of("dir") {
        Some(dir) => TestServer::new(platform, version, PathBuf::from(dir)),
        None => {
            let testing_dir = matches.value_of("testing_dir").unwrap_or(DEFAULT_TESTING_DIRECTORY);
            TestServer::in_testing_directory(Path::new(testing_dir), platform, version)
        }
    };
    server.properties = parse_properties(matches.values_of("property").into_iter().flatten())?;
    Ok(server)
}

fn docs_path(matches: &ArgMatches) -> Vec<String> {
    documentation_path(
        matches.value_of("custom_path"),
        matches.value_of("root_project").unwrap(),
        matches.value_of("project")
    )
}

fn parse_properties<'a, I: Iterator<Item=&'a str>>(values: I) -> Result<IndexMap<String, String>, Error> {
    let mut properties = IndexMap::new();
    for value in values {
        let separator = value.find('=')
            .ok_or_else(|| format_err!("Expected key=value, got {:?}", value))?;
        properties.insert(value[..separator].to_string(), value[separator + 1..].to_string());
    }
    Ok(properties)
}

/// The SFTP settings come from a config file or from the environment.
fn sftp_config(matches: &ArgMatches) -> Result<SftpConfig, Error> {
    let mut config: SftpConfig = match matches.value_of("config") {
        Some(path) => ::serde_json::from_reader(File::open(path)?)?,
        None => {
            let variable = |name: &str| env::var(name)
                .map_err(|_| format_err!("Missing environment variable {}", name));
            let mut config = SftpConfig::new(
                &variable("JAVADOC_HOST")?,
                &variable("JAVADOC_USER")?,
                &variable("JAVADOC_SECRET")?
            );
            if let Ok(port) = env::var("JAVADOC_PORT") {
                config.port = port.parse()?;
            }
            config
        }
    };
    if let Some(root_path) = matches.value_of("root_path") {
        config.root_path = root_path.into();
    }
    Ok(config)
}
