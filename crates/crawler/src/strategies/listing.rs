use crate::browser::Page;
use crate::pagination::{PaginatedSource, PaginationDriver};
use crate::strategy::{CrawlStrategy, StrategyOptions};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use job_hive_common::utils::{absolutize, extract_domain, query_param, with_query_param};
use job_hive_common::JobRecord;
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// CSS-selector description of a job board's listing pages.
///
/// All selectors except `item_selector` are evaluated relative to one item.
#[derive(Debug, Clone)]
pub struct ListingSite {
    pub name: String,
    /// Value stored in `JobRecord::source`
    pub source: String,
    pub listing_url: String,
    /// Search URL with a `{keyword}` placeholder; without it keywords are ignored
    pub search_url: Option<String>,
    pub item_selector: String,
    pub title_selector: String,
    pub link_selector: String,
    pub company_selector: String,
    /// Take only the last text node of the company element (title and
    /// company share an element on some boards)
    pub company_last_text: bool,
    pub location_selector: Option<String>,
    pub salary_selector: Option<String>,
    pub tag_selector: Option<String>,
    pub posted_selector: Option<String>,
    pub description_selector: Option<String>,
    /// Query parameter carrying the page number. None: single page listing.
    pub page_param: Option<String>,
    /// Element that only exists when there is a next page
    pub next_selector: Option<String>,
}

impl ListingSite {
    pub fn weworkremotely() -> Self {
        Self {
            name: "weworkremotely".to_string(),
            source: "weworkremotely".to_string(),
            listing_url: "https://weworkremotely.com/categories/remote-back-end-programming-jobs"
                .to_string(),
            search_url: Some("https://weworkremotely.com/remote-jobs/search?term={keyword}".to_string()),
            item_selector: "section.jobs li.new-listing-container".to_string(),
            title_selector: "h4.new-listing__header__title".to_string(),
            link_selector: "a[href^='/remote-jobs/']".to_string(),
            company_selector: "p.new-listing__company-name".to_string(),
            company_last_text: false,
            location_selector: Some("p.new-listing__company-headquarters".to_string()),
            salary_selector: None,
            tag_selector: Some("p.new-listing__categories__category".to_string()),
            posted_selector: Some("p.new-listing__header__icons__date".to_string()),
            description_selector: None,
            page_param: None,
            next_selector: None,
        }
    }

    pub fn python_jobs() -> Self {
        Self {
            name: "python-jobs".to_string(),
            source: "python.org".to_string(),
            listing_url: "https://www.python.org/jobs/".to_string(),
            search_url: Some("https://www.python.org/jobs/search/?q={keyword}".to_string()),
            item_selector: "ol.list-recent-jobs > li".to_string(),
            title_selector: "span.listing-company-name a".to_string(),
            link_selector: "span.listing-company-name a".to_string(),
            company_selector: "span.listing-company-name".to_string(),
            company_last_text: true,
            location_selector: Some("span.listing-location".to_string()),
            salary_selector: None,
            tag_selector: Some("span.listing-job-type a".to_string()),
            posted_selector: Some("span.listing-posted time".to_string()),
            description_selector: None,
            page_param: Some("page".to_string()),
            next_selector: Some("ul.pagination li.next a".to_string()),
        }
    }

    pub fn builtin() -> Vec<Self> {
        vec![Self::weworkremotely(), Self::python_jobs()]
    }

    /// First page to load for `keyword`
    pub fn start_url(&self, keyword: Option<&str>) -> String {
        match (keyword.map(str::trim).filter(|k| !k.is_empty()), &self.search_url) {
            (Some(keyword), Some(template)) => {
                let encoded: String = url::form_urlencoded::byte_serialize(keyword.as_bytes()).collect();
                template.replace("{keyword}", &encoded)
            }
            _ => self.listing_url.clone(),
        }
    }
}

struct Selectors {
    item: Selector,
    title: Selector,
    link: Selector,
    company: Selector,
    location: Option<Selector>,
    salary: Option<Selector>,
    tag: Option<Selector>,
    posted: Option<Selector>,
    description: Option<Selector>,
    next: Option<Selector>,
}

fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector '{}': {}", css, e))
}

fn parse_optional(css: &Option<String>) -> Result<Option<Selector>> {
    css.as_deref().map(parse_selector).transpose()
}

impl Selectors {
    fn compile(site: &ListingSite) -> Result<Self> {
        Ok(Self {
            item: parse_selector(&site.item_selector)?,
            title: parse_selector(&site.title_selector)?,
            link: parse_selector(&site.link_selector)?,
            company: parse_selector(&site.company_selector)?,
            location: parse_optional(&site.location_selector)?,
            salary: parse_optional(&site.salary_selector)?,
            tag: parse_optional(&site.tag_selector)?,
            posted: parse_optional(&site.posted_selector)?,
            description: parse_optional(&site.description_selector)?,
            next: parse_optional(&site.next_selector)?,
        })
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_text(item: ElementRef<'_>, selector: &Selector) -> Option<String> {
    item.select(selector)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
}

fn optional_text(item: ElementRef<'_>, selector: &Option<Selector>) -> Option<String> {
    selector.as_ref().and_then(|s| first_text(item, s))
}

/// Parse every listing item on `html`. Items missing a title, link or
/// company are dropped.
fn extract_records(html: &str, page_url: &str, site: &ListingSite, selectors: &Selectors) -> Vec<JobRecord> {
    let document = Html::parse_document(html);
    let mut records = Vec::new();
    let mut incomplete = 0;

    for item in document.select(&selectors.item) {
        let title = first_text(item, &selectors.title);
        let url = item
            .select(&selectors.link)
            .next()
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| absolutize(page_url, href));
        let company = if site.company_last_text {
            item.select(&selectors.company).next().and_then(|el| {
                el.text()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .last()
                    .map(String::from)
            })
        } else {
            first_text(item, &selectors.company)
        };

        let (Some(title), Some(url), Some(company)) = (title, url, company) else {
            incomplete += 1;
            continue;
        };

        let tags = selectors
            .tag
            .as_ref()
            .map(|s| {
                item.select(s)
                    .map(element_text)
                    .filter(|t| !t.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        records.push(JobRecord {
            title,
            company,
            url,
            source: site.source.clone(),
            description: optional_text(item, &selectors.description),
            location: optional_text(item, &selectors.location),
            salary: optional_text(item, &selectors.salary),
            tags,
            posted_at: optional_text(item, &selectors.posted),
        });
    }

    if incomplete > 0 {
        debug!(strategy = %site.name, "Dropped {} incomplete listing item(s)", incomplete);
    }
    records
}

fn has_next_page(html: &str, next: &Selector) -> bool {
    Html::parse_document(html).select(next).next().is_some()
}

/// Generic job-board strategy driven by a `ListingSite` definition
pub struct ListingStrategy {
    site: ListingSite,
    selectors: Selectors,
    driver: PaginationDriver,
    wait_timeout: Duration,
}

impl ListingStrategy {
    pub fn new(site: ListingSite, page_delay: Duration, wait_timeout: Duration) -> Result<Self> {
        let selectors =
            Selectors::compile(&site).with_context(|| format!("Invalid listing site '{}'", site.name))?;
        Ok(Self {
            site,
            selectors,
            driver: PaginationDriver::new(page_delay),
            wait_timeout,
        })
    }
}

struct ListingSource<'a> {
    strategy: &'a ListingStrategy,
    page: Arc<dyn Page>,
    start_url: String,
}

impl ListingSource<'_> {
    async fn wait_for_items(&self) -> Result<()> {
        let site = &self.strategy.site;
        if !self
            .page
            .wait_for_selector(&site.item_selector, self.strategy.wait_timeout)
            .await?
        {
            debug!(
                strategy = %site.name,
                "No listing items appeared on {} within {:?}",
                self.page.current_url(),
                self.strategy.wait_timeout
            );
        }
        Ok(())
    }
}

#[async_trait]
impl PaginatedSource for ListingSource<'_> {
    async fn load(&self) -> Result<()> {
        self.page
            .navigate(&self.start_url)
            .await
            .with_context(|| format!("Failed to load {}", self.start_url))?;
        self.wait_for_items().await
    }

    async fn extract(&self) -> Result<Vec<JobRecord>> {
        let html = self.page.content().await?;
        Ok(extract_records(
            &html,
            &self.page.current_url(),
            &self.strategy.site,
            &self.strategy.selectors,
        ))
    }

    async fn advance(&self) -> Result<bool> {
        let Some(param) = self.strategy.site.page_param.as_deref() else {
            return Ok(false);
        };

        if let Some(next) = &self.strategy.selectors.next {
            let html = self.page.content().await?;
            if !has_next_page(&html, next) {
                return Ok(false);
            }
        }

        let current_url = self.page.current_url();
        let current: u32 = query_param(&current_url, param)
            .and_then(|p| p.parse().ok())
            .unwrap_or(1);
        let next_url = with_query_param(&current_url, param, &(current + 1).to_string())?;

        self.page
            .navigate(&next_url)
            .await
            .with_context(|| format!("Failed to load page {}", current + 1))?;
        self.wait_for_items().await?;
        Ok(true)
    }
}

#[async_trait]
impl CrawlStrategy for ListingStrategy {
    fn name(&self) -> &str {
        &self.site.name
    }

    async fn crawl(&self, page: Arc<dyn Page>, options: StrategyOptions) -> Result<Vec<JobRecord>> {
        let start_url = self.site.start_url(options.keyword.as_deref());
        info!(
            strategy = %self.site.name,
            "Crawling {} (max {} results)",
            extract_domain(&start_url).unwrap_or_else(|_| start_url.clone()),
            options.max_results
        );

        let source = ListingSource {
            strategy: self,
            page,
            start_url,
        };
        let report = self.driver.run(&self.site.name, &source, &options).await?;
        Ok(report.records)
    }
}
