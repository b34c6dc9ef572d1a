//! HTTP acquirer for public company pages.

use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use time::OffsetDateTime;
use tracing::debug;
use url::Url;

use crate::application::acquisition::{Acquirer, AcquisitionError};
use crate::config::AcquisitionSettings;
use crate::domain::entities::{AcquiredPage, EmployeeRecord, PageRecord, PostRecord};
use crate::domain::timestamps::now_utc;
use crate::infra::error::InfraError;

const SOURCE: &str = "infra::acquisition";

struct Selectors {
    name: Selector,
    description: Selector,
    image: Selector,
    website: Selector,
    industry: Selector,
    size: Selector,
    specialties: Selector,
    subline: Selector,
    head_count: Selector,
    post: Selector,
    post_text: Selector,
    post_reactions: Selector,
    post_comments: Selector,
    post_media: Selector,
    employee: Selector,
    employee_name: Selector,
    employee_title: Selector,
    employee_link: Selector,
}

impl Selectors {
    fn new() -> Result<Self, InfraError> {
        Ok(Self {
            name: parse_selector("h1")?,
            description: parse_selector(r#"meta[name="description"]"#)?,
            image: parse_selector(r#"meta[property="og:image"]"#)?,
            website: parse_selector(r#"div[data-test-id="about-us__website"] dd"#)?,
            industry: parse_selector(r#"div[data-test-id="about-us__industry"] dd"#)?,
            size: parse_selector(r#"div[data-test-id="about-us__size"] dd"#)?,
            specialties: parse_selector(r#"div[data-test-id="about-us__specialties"] dd"#)?,
            subline: parse_selector(".top-card-layout__first-subline")?,
            head_count: parse_selector(".face-pile__cta")?,
            post: parse_selector("article[data-activity-urn]")?,
            post_text: parse_selector(".attributed-text-segment-list__content")?,
            post_reactions: parse_selector("[data-num-reactions]")?,
            post_comments: parse_selector("[data-num-comments]")?,
            post_media: parse_selector("img[data-delayed-url]")?,
            employee: parse_selector(r#"section[data-test-id="employees-at"] li"#)?,
            employee_name: parse_selector("h3")?,
            employee_title: parse_selector("h4")?,
            employee_link: parse_selector("a[href]")?,
        })
    }
}

fn parse_selector(selector: &str) -> Result<Selector, InfraError> {
    Selector::parse(selector)
        .map_err(|err| InfraError::configuration(format!("selector `{selector}`: {err:?}")))
}

/// Fetches `{base_url}{page_id}` and scrapes the public company page.
pub struct HttpAcquirer {
    client: Client,
    base_url: Url,
    timeout: std::time::Duration,
    selectors: Selectors,
}

impl HttpAcquirer {
    pub fn new(settings: &AcquisitionSettings) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(settings.user_agent.as_str())
            .timeout(settings.timeout)
            .build()
            .map_err(|err| InfraError::http_client(err.to_string()))?;

        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
            timeout: settings.timeout,
            selectors: Selectors::new()?,
        })
    }

    fn page_url(&self, page_id: &str) -> Result<Url, AcquisitionError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                AcquisitionError::Invalid(format!("base url `{}` cannot hold a path", self.base_url))
            })?
            .pop_if_empty()
            .push(page_id);
        Ok(url)
    }

    async fn fetch(&self, url: &Url) -> Result<String, AcquisitionError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| self.request_error(url, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AcquisitionError::navigation(
                url.as_str(),
                format!("unexpected status {status}"),
            ));
        }

        response
            .text()
            .await
            .map_err(|err| self.request_error(url, err))
    }

    fn request_error(&self, url: &Url, err: reqwest::Error) -> AcquisitionError {
        if err.is_timeout() {
            AcquisitionError::Timeout(self.timeout)
        } else {
            AcquisitionError::navigation(url.as_str(), err)
        }
    }

    fn parse(
        &self,
        page_id: &str,
        url: &Url,
        body: &str,
        now: OffsetDateTime,
    ) -> Result<AcquiredPage, AcquisitionError> {
        let document = Html::parse_document(body);
        let s = &self.selectors;

        let name = first_text(&document, &s.name);
        let description = meta_content(&document, &s.description).map(strip_about_us);
        let followers = first_text(&document, &s.subline).and_then(|line| follower_count(&line));

        if name.is_none() && description.is_none() && followers.is_none() {
            return Err(AcquisitionError::Parse(format!(
                "no company details found at {url}"
            )));
        }

        let page = PageRecord {
            page_id: page_id.to_string(),
            name: name.unwrap_or_else(|| page_id.to_string()),
            url: url.to_string(),
            linkedin_id: None,
            profile_picture: meta_content(&document, &s.image),
            description,
            website: first_text(&document, &s.website),
            industry: first_text(&document, &s.industry),
            followers: followers.unwrap_or(0),
            // Exact count when shown, otherwise the lower bound of the size band.
            head_count: first_text(&document, &s.head_count)
                .or_else(|| first_text(&document, &s.size))
                .and_then(|text| parse_count(&text))
                .unwrap_or(0),
            specialities: first_text(&document, &s.specialties)
                .map(|text| split_specialties(&text))
                .unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };

        let posts = document
            .select(&s.post)
            .filter_map(|article| self.parse_post(page_id, article, now))
            .collect::<Vec<_>>();

        let employees = document
            .select(&s.employee)
            .filter_map(|item| self.parse_employee(page_id, item, now))
            .collect::<Vec<_>>();

        Ok(AcquiredPage::new(page, posts, employees))
    }

    fn parse_post(
        &self,
        page_id: &str,
        article: ElementRef<'_>,
        now: OffsetDateTime,
    ) -> Option<PostRecord> {
        let s = &self.selectors;
        let post_id = article.value().attr("data-activity-urn")?.trim().to_string();
        if post_id.is_empty() {
            return None;
        }

        let content = article
            .select(&s.post_text)
            .next()
            .map(element_text)
            .unwrap_or_default();
        let likes = article
            .select(&s.post_reactions)
            .next()
            .and_then(|el| el.value().attr("data-num-reactions"))
            .and_then(parse_count)
            .unwrap_or(0);
        let comments_count = article
            .select(&s.post_comments)
            .next()
            .and_then(|el| el.value().attr("data-num-comments"))
            .and_then(parse_count)
            .unwrap_or(0);
        let media_url = article
            .select(&s.post_media)
            .next()
            .and_then(|el| el.value().attr("data-delayed-url"))
            .map(str::to_string);

        Some(PostRecord {
            page_id: page_id.to_string(),
            post_id,
            content,
            likes,
            comments_count,
            media_url,
            // Public pages only show relative ages ("2w").
            created_at: None,
            scraped_at: now,
        })
    }

    fn parse_employee(
        &self,
        page_id: &str,
        item: ElementRef<'_>,
        now: OffsetDateTime,
    ) -> Option<EmployeeRecord> {
        let s = &self.selectors;
        let name = item
            .select(&s.employee_name)
            .next()
            .map(element_text)
            .filter(|name| !name.is_empty())?;

        Some(EmployeeRecord {
            page_id: page_id.to_string(),
            name,
            title: item
                .select(&s.employee_title)
                .next()
                .map(element_text)
                .filter(|title| !title.is_empty()),
            profile_url: item
                .select(&s.employee_link)
                .next()
                .and_then(|el| el.value().attr("href"))
                .map(str::to_string),
            scraped_at: now,
        })
    }
}

#[async_trait]
impl Acquirer for HttpAcquirer {
    async fn acquire(&self, page_id: &str) -> Result<AcquiredPage, AcquisitionError> {
        let url = self.page_url(page_id)?;
        debug!(target = SOURCE, page_id, url = %url, "fetching page");
        let body = self.fetch(&url).await?;
        self.parse(page_id, &url, &body, now_utc())
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .map(element_text)
        .filter(|text| !text.is_empty())
}

fn meta_content(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
}

fn strip_about_us(description: String) -> String {
    match description.strip_prefix("About us") {
        Some(rest) => rest.trim_start_matches([':', ' ', '|']).trim().to_string(),
        None => description,
    }
}

fn split_specialties(text: &str) -> Vec<String> {
    text.split([',', '\n'])
        .flat_map(|part| part.split(" and "))
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// Follower count from a subline such as `Software · Berlin · 12,345 followers`.
fn follower_count(subline: &str) -> Option<u64> {
    subline
        .split('·')
        .find(|segment| segment.to_ascii_lowercase().contains("follower"))
        .and_then(parse_count)
}

/// First number in `text`, honouring thousands separators and `K`/`M`
/// suffixes.
fn parse_count(text: &str) -> Option<u64> {
    let token = text
        .split_whitespace()
        .find(|token| token.starts_with(|c: char| c.is_ascii_digit()))?;

    let cleaned: String = token.chars().filter(|c| *c != ',').collect();
    let (number, multiplier) = match cleaned.chars().last() {
        Some('K') | Some('k') => (&cleaned[..cleaned.len() - 1], 1_000.0),
        Some('M') | Some('m') => (&cleaned[..cleaned.len() - 1], 1_000_000.0),
        _ => (cleaned.as_str(), 1.0),
    };
    let number = number.trim_end_matches(|c: char| !c.is_ascii_digit() && c != '.');

    if multiplier > 1.0 {
        number
            .parse::<f64>()
            .ok()
            .map(|value| (value * multiplier).round() as u64)
    } else {
        number
            .split('.')
            .next()
            .and_then(|digits| digits.parse::<u64>().ok())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use time::macros::datetime;

    use super::*;
    use crate::config::AcquisitionMode;

    const COMPANY_PAGE: &str = r#"
        <html><head>
          <meta name="description" content="About us: Acme builds rockets and anvils.">
          <meta property="og:image" content="https://media.example.test/acme.png">
        </head><body>
          <h1> Acme Corp </h1>
          <h3 class="top-card-layout__first-subline">Aerospace · Phoenix · 1,234 followers</h3>
          <a class="face-pile__cta">View all 87 employees</a>
          <dl>
            <div data-test-id="about-us__website"><dt>Website</dt><dd>https://acme.example.test</dd></div>
            <div data-test-id="about-us__industry"><dt>Industry</dt><dd>Aerospace</dd></div>
            <div data-test-id="about-us__specialties"><dt>Specialties</dt><dd>rockets, anvils and traps</dd></div>
          </dl>
          <article data-activity-urn="urn:li:activity:1">
            <p class="attributed-text-segment-list__content">Launch day!</p>
            <span data-num-reactions="1.2K"></span>
            <span data-num-comments="14"></span>
          </article>
          <article data-activity-urn="">
            <p class="attributed-text-segment-list__content">skipped</p>
          </article>
          <section data-test-id="employees-at"><ul>
            <li><a href="https://example.test/in/wile"><h3>Wile E.</h3><h4>Engineer</h4></a></li>
            <li><h3></h3></li>
          </ul></section>
        </body></html>
    "#;

    fn acquirer() -> HttpAcquirer {
        HttpAcquirer::new(&AcquisitionSettings {
            mode: AcquisitionMode::Http,
            base_url: Url::parse("https://pages.example.test/company/").expect("url"),
            user_agent: "pagelens-test".to_string(),
            timeout: Duration::from_secs(5),
        })
        .expect("acquirer")
    }

    #[test]
    fn parses_company_page() {
        let acquirer = acquirer();
        let url = acquirer.page_url("acme").expect("url");
        let now = datetime!(2024-05-01 12:00 UTC);

        let bundle = acquirer
            .parse("acme", &url, COMPANY_PAGE, now)
            .expect("parsed");

        assert_eq!(url.as_str(), "https://pages.example.test/company/acme");
        assert_eq!(bundle.page.name, "Acme Corp");
        assert_eq!(
            bundle.page.description.as_deref(),
            Some("Acme builds rockets and anvils.")
        );
        assert_eq!(bundle.page.followers, 1_234);
        assert_eq!(bundle.page.head_count, 87);
        assert_eq!(bundle.page.industry.as_deref(), Some("Aerospace"));
        assert_eq!(bundle.page.specialities, vec!["rockets", "anvils", "traps"]);
        assert_eq!(bundle.posts.len(), 1);
        assert_eq!(bundle.posts[0].likes, 1_200);
        assert_eq!(bundle.posts[0].comments_count, 14);
        assert_eq!(bundle.employees.len(), 1);
        assert_eq!(bundle.employees[0].title.as_deref(), Some("Engineer"));
    }

    #[test]
    fn empty_document_is_a_parse_error() {
        let acquirer = acquirer();
        let url = acquirer.page_url("ghost").expect("url");
        let err = acquirer
            .parse("ghost", &url, "<html><body></body></html>", now_utc())
            .expect_err("nothing to parse");
        assert!(matches!(err, AcquisitionError::Parse(_)));
    }

    #[test]
    fn counts_handle_separators_and_suffixes() {
        assert_eq!(parse_count("12,345 followers"), Some(12_345));
        assert_eq!(parse_count("3.4M"), Some(3_400_000));
        assert_eq!(parse_count("no digits"), None);
        assert_eq!(follower_count("Software · Berlin · 980 followers"), Some(980));
    }

    #[test]
    fn identifiers_are_encoded_into_one_segment() {
        let url = acquirer().page_url("acme?x=1#top").expect("url");
        assert_eq!(url.as_str(), "https://pages.example.test/company/acme%3Fx=1%23top");
    }
}
