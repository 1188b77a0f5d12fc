//! Client for the Bibliothek build-metadata service.
//!
//! The service exposes three endpoints per project and version:
//! - `/v2/projects/{project}/versions/{version}` lists the build numbers
//! - `/v2/projects/{project}/versions/{version}/builds/{build}` lists the downloadable artifacts
//! - `.../builds/{build}/downloads/{file}` serves the artifact itself
use std::fmt::{self, Display, Formatter};
use std::io::Write;

use failure_derive::Fail;
use indexmap::IndexMap;
use log::{debug, trace};
use serde::de::DeserializeOwned;
use serde_derive::Deserialize;

use crate::utils::{self, CurlClient, HttpClient, TransferError};

/// The artifact name the server jars are published under
pub const DEFAULT_ARTIFACT: &str = "application";

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct BuildQuery {
    pub project: String,
    pub version: String,
}
impl BuildQuery {
    #[inline]
    pub fn new<P: Into<String>, V: Into<String>>(project: P, version: V) -> BuildQuery {
        BuildQuery { project: project.into(), version: version.into() }
    }
    #[inline]
    fn at(&self, build: u32) -> BuildRef {
        BuildRef { query: self.clone(), build: Some(build) }
    }
    #[inline]
    fn latest(&self) -> BuildRef {
        BuildRef { query: self.clone(), build: None }
    }
}
impl Display for BuildQuery {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{} v{}", self.project, self.version)
    }
}

/// The project, version and (if known) build an error happened on
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BuildRef {
    pub query: BuildQuery,
    pub build: Option<u32>,
}
impl Display for BuildRef {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.query)?;
        if let Some(build) = self.build {
            write!(f, "#{}", build)?;
        }
        Ok(())
    }
}

#[derive(Debug, Fail)]
pub enum BibliothekError {
    #[fail(display = "Network error while requesting {} for {}: {}", url, context, cause)]
    Network {
        context: BuildRef,
        url: String,
        #[fail(cause)]
        cause: TransferError,
    },
    #[fail(display = "Could not fetch metadata of {}: {}", context, reason)]
    MetadataFetch {
        context: BuildRef,
        reason: String,
    },
    #[fail(display = "Could not get the download url of {}: artifact {} is unknown", context, artifact)]
    UnknownArtifact {
        context: BuildRef,
        artifact: String,
    },
    #[fail(display = "No builds are available for {}", query)]
    NoBuildAvailable {
        query: BuildQuery,
    },
    #[fail(display = "Download of {} failed with HTTP {}", url, status)]
    DownloadFailed {
        context: BuildRef,
        url: String,
        status: u32,
    },
}

#[derive(Debug, Deserialize)]
struct VersionResponse {
    builds: Vec<u32>,
}
#[derive(Debug, Deserialize)]
struct BuildResponse {
    downloads: IndexMap<String, Artifact>,
}

/// A downloadable file of a build
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub struct Artifact {
    pub name: String,
    /// Hex SHA-1 of the file, when the service publishes one
    #[serde(default)]
    pub sha1: Option<String>,
}

#[derive(Clone, Debug)]
pub struct BuildInfo {
    pub build: u32,
    /// Artifacts keyed by name, in the order the service listed them
    pub downloads: IndexMap<String, Artifact>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DownloadTarget {
    pub build: u32,
    pub url: String,
    pub file_name: String,
    pub sha1: Option<String>,
}

pub struct Bibliothek<C = CurlClient> {
    base_url: String,
    client: C,
}
impl Bibliothek<CurlClient> {
    #[inline]
    pub fn new(base_url: &str) -> Bibliothek<CurlClient> {
        Bibliothek::with_client(base_url, CurlClient)
    }
}
impl<C: HttpClient> Bibliothek<C> {
    pub fn with_client(base_url: &str, client: C) -> Bibliothek<C> {
        Bibliothek { base_url: base_url.trim_end_matches('/').into(), client }
    }
    #[inline]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
    #[inline]
    pub fn client(&self) -> &C {
        &self.client
    }
    fn version_url(&self, query: &BuildQuery) -> String {
        format!(
            "{}/v2/projects/{}/versions/{}",
            self.base_url, query.project, query.version
        )
    }
    fn build_url(&self, query: &BuildQuery, build: u32) -> String {
        format!("{}/builds/{}", self.version_url(query), build)
    }
    /// The highest build number published for the version
    pub fn latest_build(&self, query: &BuildQuery) -> Result<u32, BibliothekError> {
        let url = self.version_url(query);
        let response: VersionResponse = self.fetch_json(&url, query.latest())?;
        trace!("Builds of {}: {:?}", query, response.builds);
        response.builds.into_iter().max()
            .ok_or_else(|| BibliothekError::NoBuildAvailable { query: query.clone() })
    }
    pub fn build_info(&self, query: &BuildQuery, build: u32) -> Result<BuildInfo, BibliothekError> {
        let url = self.build_url(query, build);
        let response: BuildResponse = self.fetch_json(&url, query.at(build))?;
        Ok(BuildInfo { build, downloads: response.downloads })
    }
    /// Resolve where the named artifact of a build can be downloaded from
    pub fn download_target(
        &self,
        query: &BuildQuery,
        build: u32,
        artifact: &str
    ) -> Result<DownloadTarget, BibliothekError> {
        let mut info = self.build_info(query, build)?;
        let artifact_info = info.downloads.swap_remove(artifact)
            .ok_or_else(|| BibliothekError::UnknownArtifact {
                context: query.at(build),
                artifact: artifact.into()
            })?;
        let url = format!("{}/downloads/{}", self.build_url(query, build), artifact_info.name);
        debug!("Resolved {} of {} to {}", artifact, query.at(build), url);
        Ok(DownloadTarget {
            build,
            url,
            file_name: artifact_info.name,
            sha1: artifact_info.sha1
        })
    }
    /// Stream the artifact into `output`
    pub fn download(
        &self,
        query: &BuildQuery,
        target: &DownloadTarget,
        output: &mut dyn Write
    ) -> Result<(), BibliothekError> {
        let context = query.at(target.build);
        let status = self.client.get(&target.url, output)
            .map_err(|cause| BibliothekError::Network {
                context: context.clone(),
                url: target.url.clone(),
                cause
            })?;
        if status != 200 {
            return Err(BibliothekError::DownloadFailed { context, url: target.url.clone(), status })
        }
        Ok(())
    }
    fn fetch_json<T: DeserializeOwned>(&self, url: &str, context: BuildRef) -> Result<T, BibliothekError> {
        trace!("GET {}", url);
        let (status, body) = match utils::get_buffer(&self.client, url) {
            Ok(response) => response,
            Err(cause) => return Err(BibliothekError::Network { context, url: url.into(), cause })
        };
        if status != 200 {
            return Err(BibliothekError::MetadataFetch { context, reason: format!("HTTP {}", status) })
        }
        ::serde_json::from_slice(&body).map_err(|e| BibliothekError::MetadataFetch {
            context,
            reason: format!("malformed response: {}", e)
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::MockHttp;

    const API: &str = "https://api.example.org";

    fn demo() -> BuildQuery {
        BuildQuery::new("demo", "1.0")
    }

    #[test]
    fn latest_build_is_the_maximum() {
        let http = MockHttp::new()
            .json(&format!("{}/v2/projects/demo/versions/1.0", API), r#"{"builds": [120, 118, 122]}"#);
        let api = Bibliothek::with_client(API, &http);
        assert_eq!(api.latest_build(&demo()).unwrap(), 122);
    }

    #[test]
    fn empty_build_list_has_no_build() {
        let http = MockHttp::new()
            .json(&format!("{}/v2/projects/demo/versions/1.0", API), r#"{"builds": []}"#);
        let api = Bibliothek::with_client(API, &http);
        match api.latest_build(&demo()) {
            Err(BibliothekError::NoBuildAvailable { query }) => assert_eq!(query, demo()),
            other => panic!("Unexpected result {:?}", other),
        }
    }

    #[test]
    fn non_200_is_a_metadata_error() {
        let http = MockHttp::new()
            .respond(&format!("{}/v2/projects/demo/versions/1.0", API), 404, b"not found");
        let api = Bibliothek::with_client(API, &http);
        match api.latest_build(&demo()) {
            Err(BibliothekError::MetadataFetch { context, reason }) => {
                assert_eq!(context.query, demo());
                assert_eq!(context.build, None);
                assert_eq!(reason, "HTTP 404");
            }
            other => panic!("Unexpected result {:?}", other),
        }
    }

    #[test]
    fn malformed_body_is_a_metadata_error() {
        let http = MockHttp::new()
            .json(&format!("{}/v2/projects/demo/versions/1.0", API), r#"{"builds": "nope"}"#);
        let api = Bibliothek::with_client(API, &http);
        match api.latest_build(&demo()) {
            Err(BibliothekError::MetadataFetch { .. }) => {}
            other => panic!("Unexpected result {:?}", other),
        }
    }

    #[test]
    fn transport_failure_is_a_network_error() {
        // Nothing registered, the mock fails the transfer
        let http = MockHttp::new();
        let api = Bibliothek::with_client(API, &http);
        match api.latest_build(&demo()) {
            Err(BibliothekError::Network { url, .. }) => {
                assert_eq!(url, format!("{}/v2/projects/demo/versions/1.0", API));
            }
            other => panic!("Unexpected result {:?}", other),
        }
    }

    #[test]
    fn resolves_download_target() {
        let http = MockHttp::new().json(
            &format!("{}/v2/projects/demo/versions/1.0/builds/122", API),
            r#"{"downloads": {"application": {"name": "demo-1.0-122.jar", "sha1": "abc"}}}"#
        );
        let api = Bibliothek::with_client(&format!("{}/", API), &http);
        let target = api.download_target(&demo(), 122, DEFAULT_ARTIFACT).unwrap();
        assert!(target.url.ends_with("/builds/122/downloads/demo-1.0-122.jar"), "{}", target.url);
        assert_eq!(target.url, format!("{}/v2/projects/demo/versions/1.0/builds/122/downloads/demo-1.0-122.jar", API));
        assert_eq!(target.file_name, "demo-1.0-122.jar");
        assert_eq!(target.sha1.as_ref().map(String::as_str), Some("abc"));
    }

    #[test]
    fn unknown_artifact() {
        let http = MockHttp::new().json(
            &format!("{}/v2/projects/demo/versions/1.0/builds/7", API),
            r#"{"downloads": {"mojang-mappings": {"name": "mappings.txt", "sha1": "abc"}}}"#
        );
        let api = Bibliothek::with_client(API, &http);
        match api.download_target(&demo(), 7, DEFAULT_ARTIFACT) {
            Err(BibliothekError::UnknownArtifact { context, artifact }) => {
                assert_eq!(context.build, Some(7));
                assert_eq!(artifact, "application");
            }
            other => panic!("Unexpected result {:?}", other),
        }
    }

    #[test]
    fn failed_download() {
        let url = format!("{}/v2/projects/demo/versions/1.0/builds/7/downloads/demo.jar", API);
        let http = MockHttp::new().respond(&url, 500, b"oops");
        let api = Bibliothek::with_client(API, &http);
        let target = DownloadTarget { build: 7, url: url.clone(), file_name: "demo.jar".into(), sha1: None };
        let mut sink = Vec::new();
        match api.download(&demo(), &target, &mut sink) {
            Err(BibliothekError::DownloadFailed { status, .. }) => assert_eq!(status, 500),
            other => panic!("Unexpected result {:?}", other),
        }
    }
}
