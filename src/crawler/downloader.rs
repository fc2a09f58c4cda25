//! Page downloader with redirect reconciliation
//!
//! When the URL a page was finally served from differs from the page's URI,
//! the downloader decides what that means for the scan:
//!
//! | Effective URL | Outcome |
//! |---------------|---------|
//! | Owned by another site, or by none | `DownloadError::OffSite` |
//! | Carries a `#fragment` | Wait, then fetch it again without the fragment |
//! | https version of the site's base URL | Site upgraded, scan replaced, `DownloadError::BaseUrlUpgraded` |
//! | Already a page of the scan | `DownloadError::AlreadyFound` (unless it is the https version of the requested URI) |
//! | Anything else | The page takes the effective URL |
//!
//! The decision is a pure function of what is known about the redirect
//! (`reconcile`); `Downloader::download` gathers those facts, applies the
//! decision and does the waiting.

use crate::crawler::fetcher::{FetchResult, PageFetcher};
use crate::scan::replace_scan_after_upgrade;
use crate::storage::{lock, PageRecord, ScanRecord, SharedStorage, SiteRecord, Storage, StorageError};
use crate::url::{downgrade_to_http, has_fragment, is_https, strip_fragment};
use crate::{config::CrawlerConfig, DownloadError};
use std::time::Duration;

/// What is known about one redirect
#[derive(Debug, Clone, Copy)]
pub struct RedirectFacts<'a> {
    /// The page's URI as currently stored
    pub page_uri: &'a str,
    /// The URI fetched in this attempt
    pub requested_uri: &'a str,
    /// The URL the response finally came from
    pub effective_uri: &'a str,
    /// The site being scanned
    pub site: &'a SiteRecord,
    /// The registry's owner of `effective_uri`
    pub owner: Option<&'a SiteRecord>,
    /// Whether the scan already has a page for `effective_uri`
    pub effective_already_found: bool,
}

/// What to do with a downloaded page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// The page was served from its own URI
    Unchanged,
    /// Fetch again from `uri`, the effective URL without its fragment
    RetryWithoutFragment { uri: String },
    /// The effective URL belongs to another site, or to none
    OffSite { effective: String },
    /// The site itself moved to https; `base_url` is its new base URL
    UpgradeBaseUrl { base_url: String },
    /// Another page of the scan already has the effective URL
    AlreadyFound { effective: String },
    /// The page takes the effective URL
    UpdatePageUri { effective: String },
}

/// Decides what a redirect means for the page being downloaded
pub fn reconcile(facts: &RedirectFacts<'_>) -> Reconciliation {
    let effective = facts.effective_uri;

    if effective == facts.page_uri {
        return Reconciliation::Unchanged;
    }

    match facts.owner {
        Some(owner) if owner.id == facts.site.id => {}
        _ => {
            return Reconciliation::OffSite {
                effective: effective.to_string(),
            }
        }
    }

    if has_fragment(effective) {
        return Reconciliation::RetryWithoutFragment {
            uri: strip_fragment(effective).to_string(),
        };
    }

    if is_https(effective) && downgrade_to_http(effective) == facts.site.base_url {
        return Reconciliation::UpgradeBaseUrl {
            base_url: effective.to_string(),
        };
    }

    let is_upgrade_of_requested =
        is_https(effective) && downgrade_to_http(effective) == facts.requested_uri;

    if !is_upgrade_of_requested && facts.effective_already_found {
        return Reconciliation::AlreadyFound {
            effective: effective.to_string(),
        };
    }

    Reconciliation::UpdatePageUri {
        effective: effective.to_string(),
    }
}

/// How fragment redirects are retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wait before fetching the URL again
    pub delay: Duration,
    /// Fragment redirects followed before the page is abandoned
    pub max_fragment_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(1),
            max_fragment_retries: 1,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            delay: config.fragment_retry_delay(),
            max_fragment_retries: config.max_fragment_retries,
        }
    }
}

/// Downloads pages and reconciles them with the scan
pub struct Downloader<F, S> {
    fetcher: F,
    storage: SharedStorage<S>,
    policy: RetryPolicy,
}

impl<F, S> Downloader<F, S>
where
    F: PageFetcher,
    S: Storage,
{
    pub fn new(fetcher: F, storage: SharedStorage<S>, policy: RetryPolicy) -> Self {
        Self {
            fetcher,
            storage,
            policy,
        }
    }

    /// Downloads one page of a scan
    ///
    /// # Arguments
    ///
    /// * `site` - The site being scanned
    /// * `scan` - The scan the page belongs to
    /// * `page` - The page, with its URI as stored
    /// * `requested_uri` - The URI to fetch
    ///
    /// # Returns
    ///
    /// * `Ok(Some(body))` - The page's HTML; the page now carries the effective URL
    /// * `Ok(None)` - The content type is not HTML
    /// * `Err(AuditError::Network)` - The transfer failed
    /// * `Err(AuditError::Download)` - The page was abandoned by reconciliation
    pub async fn download(
        &self,
        site: &SiteRecord,
        scan: &ScanRecord,
        page: &PageRecord,
        requested_uri: &str,
    ) -> crate::Result<Option<String>> {
        let mut uri = requested_uri.to_string();
        let mut fragment_retries = 0;

        loop {
            let (effective, body) = match self.fetcher.fetch(&uri).await? {
                FetchResult::Html {
                    effective_url,
                    body,
                } => (effective_url, body),
                FetchResult::Rejected { .. } => return Ok(None),
            };

            let decision = self.decide(site, scan, page, &uri, &effective)?;

            match decision {
                Reconciliation::Unchanged => return Ok(Some(body)),
                Reconciliation::RetryWithoutFragment { uri: stripped } => {
                    if fragment_retries >= self.policy.max_fragment_retries {
                        return Err(DownloadError::FragmentLoop {
                            uri: effective,
                            attempts: fragment_retries,
                        }
                        .into());
                    }
                    fragment_retries += 1;
                    tracing::debug!(
                        page_id = page.id,
                        "Effective URI {} has a fragment, fetching {}",
                        effective,
                        stripped
                    );
                    tokio::time::sleep(self.policy.delay).await;
                    uri = stripped;
                }
                Reconciliation::OffSite { effective } => {
                    return Err(DownloadError::OffSite { effective }.into())
                }
                Reconciliation::AlreadyFound { effective } => {
                    return Err(DownloadError::AlreadyFound { effective }.into())
                }
                Reconciliation::UpgradeBaseUrl { base_url } => {
                    self.upgrade_base_url(site, scan, &base_url)?;
                    return Err(DownloadError::BaseUrlUpgraded { base_url }.into());
                }
                Reconciliation::UpdatePageUri { effective } => {
                    self.update_page_uri(scan, page, &effective)?;
                    return Ok(Some(body));
                }
            }
        }
    }

    /// Looks up the facts about a redirect and decides on it
    fn decide(
        &self,
        site: &SiteRecord,
        scan: &ScanRecord,
        page: &PageRecord,
        requested_uri: &str,
        effective: &str,
    ) -> crate::Result<Reconciliation> {
        if effective == page.uri {
            return Ok(Reconciliation::Unchanged);
        }

        let storage = lock(&self.storage)?;
        let owner = storage.closest_site_for_url(effective)?;
        let effective_already_found = storage
            .get_page_by_scan_and_uri(scan.id, effective)?
            .is_some();

        Ok(reconcile(&RedirectFacts {
            page_uri: &page.uri,
            requested_uri,
            effective_uri: effective,
            site,
            owner: owner.as_ref(),
            effective_already_found,
        }))
    }

    fn upgrade_base_url(
        &self,
        site: &SiteRecord,
        scan: &ScanRecord,
        base_url: &str,
    ) -> crate::Result<()> {
        let mut storage = lock(&self.storage)?;
        if replace_scan_after_upgrade(&mut *storage, site.id, scan.id, base_url)?.is_none() {
            tracing::debug!(
                scan_id = scan.id,
                "Site {} was already upgraded by another page",
                site.id
            );
        }
        Ok(())
    }

    fn update_page_uri(
        &self,
        scan: &ScanRecord,
        page: &PageRecord,
        effective: &str,
    ) -> crate::Result<()> {
        let mut storage = lock(&self.storage)?;

        // The scan may have been deleted while the page was downloading
        if storage.get_scan(scan.id)?.is_none() || storage.get_page(page.id)?.is_none() {
            return Err(DownloadError::ScanDeleted { scan_id: scan.id }.into());
        }

        match storage.update_page_uri(page.id, effective) {
            Ok(true) => {
                tracing::debug!(page_id = page.id, "Page {} is now {}", page.uri, effective);
                Ok(())
            }
            Ok(false) => Err(DownloadError::AlreadyFound {
                effective: effective.to_string(),
            }
            .into()),
            Err(StorageError::PageNotFound(_)) => {
                Err(DownloadError::ScanDeleted { scan_id: scan.id }.into())
            }
            Err(e) => Err(e.into()),
        }
    }
}
