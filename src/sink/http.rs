//! HTTP document store sink.
//!
//! Writes every artifact as one JSON document with a single POST to
//! `<base>/<prefix>-<date>/<type>`. Before the first export (and again after any
//! host failure) the remote index template is checked and, when missing or
//! older than the bundled one, replaced.

use crate::config::HttpSinkConfig;
use crate::endpoint::Endpoint;
use crate::error::{ConfigurationError, SinkError};
use crate::event::{Event, RenderParams};
use crate::scrub::{scrub, scrub_display};
use crate::sink::template::{compare_installed, IndexTemplate, TemplateDecision};
use crate::sink::Sink;
use crate::stats::StatsSnapshot;
use crate::types::{format_date, is_path_segment, is_valid_date_format};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Certificate, Client, Method, Response, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Running totals of documents handed to the remote store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HttpSinkStats {
    pub documents_sent: u64,
    pub documents_failed: u64,
}

#[derive(Debug, Default)]
struct DestinationCache {
    date: String,
    paths: HashMap<String, String>,
}

pub struct HttpSink {
    name: String,
    /// Taken on close; dropping the client releases pooled connections.
    client: RwLock<Option<Client>>,
    /// Preferred host first.
    hosts: Mutex<Vec<Endpoint>>,
    template: IndexTemplate,
    template_name: String,
    template_checked: AtomicBool,
    index_prefix: String,
    index_time_format: String,
    render: RenderParams,
    destinations: Mutex<DestinationCache>,
    documents_sent: AtomicU64,
    documents_failed: AtomicU64,
}

impl HttpSink {
    /// Build a sink around the bundled template.
    pub fn new(config: &HttpSinkConfig, render: RenderParams) -> Result<Self, ConfigurationError> {
        Self::with_template(config, render, IndexTemplate::bundled()?)
    }

    /// Resolves every host eagerly; any misconfiguration fails here.
    pub fn with_template(
        config: &HttpSinkConfig,
        render: RenderParams,
        template: IndexTemplate,
    ) -> Result<Self, ConfigurationError> {
        if config.hosts.is_empty() {
            return Err(ConfigurationError::Invalid(format!(
                "no hosts configured for sink [{}]",
                config.name
            )));
        }
        let hosts = config
            .hosts
            .iter()
            .map(|spec| Endpoint::parse(spec))
            .collect::<Result<Vec<_>, _>>()?;
        // Probe url construction so a bad endpoint never reaches the first export.
        for endpoint in &hosts {
            endpoint.url_for("")?;
        }
        if !is_valid_date_format(&config.index_time_format)
            || !is_path_segment(&format_date(0, &config.index_time_format))
        {
            return Err(ConfigurationError::Invalid(format!(
                "invalid index time format [{}] for sink [{}]",
                config.index_time_format, config.name
            )));
        }
        if !is_path_segment(&config.index_prefix) {
            return Err(ConfigurationError::Invalid(format!(
                "invalid index prefix [{}] for sink [{}]",
                config.index_prefix, config.name
            )));
        }

        let mut builder = Client::builder()
            .no_proxy()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.read_timeout_ms));
        if let Some(path) = &config.ca_bundle_path {
            builder = builder.add_root_certificate(load_ca_bundle(path)?);
        }
        let client = builder
            .build()
            .map_err(|e| ConfigurationError::HttpClient(scrub_display(&e)))?;

        info!(
            sink = %config.name,
            hosts = %describe_hosts(&hosts),
            template_version = %template.version(),
            "HTTP sink created"
        );

        Ok(Self {
            name: config.name.clone(),
            client: RwLock::new(Some(client)),
            hosts: Mutex::new(hosts),
            template,
            template_name: config.template_name.clone(),
            template_checked: AtomicBool::new(false),
            index_prefix: config.index_prefix.clone(),
            index_time_format: config.index_time_format.clone(),
            render,
            destinations: Mutex::new(DestinationCache::default()),
            documents_sent: AtomicU64::new(0),
            documents_failed: AtomicU64::new(0),
        })
    }

    /// Hosts in current preference order.
    pub fn hosts(&self) -> Vec<Endpoint> {
        self.hosts.lock().clone()
    }

    pub fn stats(&self) -> HttpSinkStats {
        HttpSinkStats {
            documents_sent: self.documents_sent.load(Ordering::Relaxed),
            documents_failed: self.documents_failed.load(Ordering::Relaxed),
        }
    }

    pub fn template_checked(&self) -> bool {
        self.template_checked.load(Ordering::Acquire)
    }

    fn client(&self) -> Result<Client, SinkError> {
        self.client
            .read()
            .clone()
            .ok_or_else(|| SinkError::Closed(self.name.clone()))
    }

    /// Request path (below the endpoint base path) for an artifact. Document
    /// types that would not stay a single path segment are refused.
    pub fn destination(&self, timestamp: u64, doc_type: &str) -> Result<String, SinkError> {
        if !is_path_segment(doc_type) {
            return Err(SinkError::Render(format!("invalid document type [{}]", doc_type)));
        }
        let date = format_date(timestamp, &self.index_time_format);
        let mut cache = self.destinations.lock();
        if cache.date != date {
            cache.paths.clear();
            cache.date = date;
        }
        let DestinationCache { date, paths } = &mut *cache;
        let path = paths
            .entry(doc_type.to_string())
            .or_insert_with(|| format!("{}-{}/{}", self.index_prefix, date, doc_type))
            .clone();
        Ok(path)
    }

    /// Send one request, failing over across hosts on transport errors.
    async fn send(
        &self,
        method: Method,
        suffix: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Response, SinkError> {
        let client = self.client()?;
        let hosts = self.hosts();

        for (idx, endpoint) in hosts.iter().enumerate() {
            let url = endpoint
                .url_for(suffix)
                .map_err(|e| SinkError::Transport(e.to_string()))?;
            let mut request = client.request(method.clone(), url);
            if let Some((user, password)) = endpoint.credentials() {
                request = request.basic_auth(user, password);
            }
            if let Some(body) = &body {
                request = request
                    .header(CONTENT_TYPE, "application/json")
                    .body(body.clone());
            }

            match request.send().await {
                Ok(response) => {
                    if idx > 0 {
                        // Failed hosts move to the back of the list.
                        self.hosts.lock().rotate_left(idx);
                        info!(sink = %self.name, host = %endpoint, "Switched to host");
                    }
                    return Ok(response);
                }
                Err(err) => {
                    warn!(
                        sink = %self.name,
                        host = %endpoint,
                        error = %scrub_display(&err),
                        "Error connecting to host"
                    );
                    // A restarted target may have lost its template.
                    self.template_checked.store(false, Ordering::Release);
                }
            }
        }

        Err(SinkError::NoAvailableHost(describe_hosts(&hosts)))
    }

    /// Make sure the remote template is present and current.
    pub async fn ensure_template(&self) -> Result<(), SinkError> {
        if self.template_checked() {
            return Ok(());
        }
        let path = format!("_template/{}", self.template_name);
        let response = self.send(Method::GET, &path, None).await?;
        let expected = self.template.version();

        if response.status() == StatusCode::OK {
            let installed = response
                .bytes()
                .await
                .map_err(|e| SinkError::Transport(scrub_display(&e)))?;
            match compare_installed(&installed, expected) {
                TemplateDecision::Accept(found) => {
                    debug!(sink = %self.name, installed = %found, "Index template is current");
                }
                TemplateDecision::AcceptUnversioned => {
                    warn!(
                        sink = %self.name,
                        template = %self.template_name,
                        "Installed index template has no version; leaving it in place"
                    );
                }
                TemplateDecision::Replace(found) => {
                    info!(
                        sink = %self.name,
                        installed = %found,
                        expected = %expected,
                        "Index template is outdated; replacing"
                    );
                    self.upload_template(&path).await?;
                }
            }
        } else {
            info!(sink = %self.name, template = %self.template_name, "Index template missing; uploading");
            self.upload_template(&path).await?;
        }

        self.template_checked.store(true, Ordering::Release);
        Ok(())
    }

    async fn upload_template(&self, path: &str) -> Result<(), SinkError> {
        let response = self
            .send(Method::PUT, path, Some(self.template.body().to_vec()))
            .await?;
        let status = response.status();
        if is_accepted(status) {
            info!(sink = %self.name, version = %self.template.version(), "Index template uploaded");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(SinkError::Template(format!(
                "upload of template [{}] failed with status {}: {}",
                self.template_name,
                status,
                scrub(&body)
            )))
        }
    }

    /// POST one document. A non-success status drops it and is reported as a
    /// rejection; transport failure on every host is returned as is.
    async fn post_document(&self, timestamp: u64, doc_type: &str, body: &Value) -> Result<(), SinkError> {
        let path = match self.destination(timestamp, doc_type) {
            Ok(path) => path,
            Err(err) => {
                self.documents_failed.fetch_add(1, Ordering::Relaxed);
                error!(sink = %self.name, error = %err, "Dropping document");
                return Err(SinkError::Rejected {
                    failed: 1,
                    total: 1,
                });
            }
        };
        let payload = serde_json::to_vec(body).map_err(|e| SinkError::Render(e.to_string()))?;
        let response = self.send(Method::POST, &path, Some(payload)).await?;
        let status = response.status();
        if is_accepted(status) {
            self.documents_sent.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        self.documents_failed.fetch_add(1, Ordering::Relaxed);
        let text = response.text().await.unwrap_or_default();
        error!(
            sink = %self.name,
            doc_type = doc_type,
            status = status.as_u16(),
            response = %scrub(&text),
            "Remote store rejected document"
        );
        Err(SinkError::Rejected {
            failed: 1,
            total: 1,
        })
    }
}

#[async_trait]
impl Sink for HttpSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self) {
        debug!(sink = %self.name, "HTTP sink started");
    }

    fn stop(&self) {
        debug!(sink = %self.name, "HTTP sink stopped");
    }

    fn close(&self) {
        if self.client.write().take().is_some() {
            info!(sink = %self.name, "HTTP sink closed");
        }
    }

    async fn export_snapshot(&self, snapshot: &StatsSnapshot) -> Result<(), SinkError> {
        self.client()?;
        self.ensure_template().await?;

        let total = snapshot.documents.len();
        let mut failed = 0;
        for document in &snapshot.documents {
            match self
                .post_document(snapshot.collected_at, &document.doc_type, &document.body)
                .await
            {
                Ok(()) => {}
                Err(SinkError::Rejected { .. }) => failed += 1,
                Err(err) => return Err(err),
            }
        }

        if failed > 0 {
            return Err(SinkError::Rejected { failed, total });
        }
        debug!(sink = %self.name, documents = total, "Exported snapshot");
        Ok(())
    }

    async fn export_event(&self, event: &Event) -> Result<(), SinkError> {
        self.client()?;
        self.ensure_template().await?;
        let document = event.to_document(&self.render);
        self.post_document(event.timestamp(), event.type_tag(), &document)
            .await
    }
}

fn load_ca_bundle(path: &Path) -> Result<Certificate, ConfigurationError> {
    let ca_error = |reason: String| ConfigurationError::CaBundle {
        path: path.display().to_string(),
        reason,
    };
    let pem = fs::read(path).map_err(|e| ca_error(e.to_string()))?;
    let certificate = Certificate::from_pem(&pem).map_err(|e| ca_error(e.to_string()))?;
    debug!(path = %path.display(), "Loaded CA bundle");
    Ok(certificate)
}

fn is_accepted(status: StatusCode) -> bool {
    status == StatusCode::OK || status == StatusCode::CREATED
}

fn describe_hosts(hosts: &[Endpoint]) -> String {
    hosts
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
