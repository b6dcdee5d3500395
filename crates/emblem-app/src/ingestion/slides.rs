//! Google Slides deck as an item source.
//!
//! Every page element of every slide becomes one item, in deck order, so the
//! sequence is stable as long as the deck is not edited between runs.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::debug;

use crate::ingestion::{ItemSource, SourceError};
use crate::pipeline::Item;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presentation {
    #[serde(default)]
    slides: Vec<Page>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Page {
    #[serde(default)]
    page_elements: Vec<PageElement>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageElement {
    image: Option<ImageElement>,
    shape: Option<ShapeElement>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageElement {
    content_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShapeElement {
    shape_properties: Option<ShapeProperties>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShapeProperties {
    shape_background_fill: Option<BackgroundFill>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BackgroundFill {
    stretched_picture_properties: Option<StretchedPicture>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StretchedPicture {
    content_url: Option<String>,
}

impl PageElement {
    fn content_url(&self) -> Option<&str> {
        let from_image = self.image.as_ref().and_then(|img| img.content_url.as_deref());
        let from_fill = || {
            self.shape
                .as_ref()?
                .shape_properties
                .as_ref()?
                .shape_background_fill
                .as_ref()?
                .stretched_picture_properties
                .as_ref()?
                .content_url
                .as_deref()
        };
        from_image.or_else(from_fill).filter(|url| !url.is_empty())
    }
}

/// Flatten a presentation into items tagged with their 1-based slide number.
pub fn items_from_presentation(presentation: &Presentation) -> Vec<Item> {
    presentation
        .slides
        .iter()
        .enumerate()
        .flat_map(|(slide, page)| {
            page.page_elements
                .iter()
                .map(move |element| (slide + 1, element.content_url().map(str::to_string)))
        })
        .enumerate()
        .map(|(index, (group, locator))| Item::new(index, group, locator))
        .collect()
}

#[derive(Debug, Clone)]
pub struct SlidesItemSource {
    http: Client,
    endpoint: Url,
    presentation_id: String,
    access_token: String,
}

impl SlidesItemSource {
    pub fn new(
        http: Client,
        api_base: &str,
        presentation_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Result<Self, SourceError> {
        let presentation_id = presentation_id.into();
        let mut endpoint =
            Url::parse(api_base).map_err(|_| SourceError::InvalidEndpoint(api_base.into()))?;
        endpoint
            .path_segments_mut()
            .map_err(|_| SourceError::InvalidEndpoint(api_base.into()))?
            .pop_if_empty()
            .extend(["v1", "presentations", presentation_id.as_str()]);
        Ok(Self {
            http,
            endpoint,
            presentation_id,
            access_token: access_token.into(),
        })
    }

    /// Build from the `GOOGLE_OAUTH_ACCESS_TOKEN` environment variable.
    pub fn from_env(
        http: Client,
        api_base: &str,
        presentation_id: impl Into<String>,
    ) -> Result<Self, SourceError> {
        let token =
            std::env::var("GOOGLE_OAUTH_ACCESS_TOKEN").map_err(|_| SourceError::MissingAccessToken)?;
        Self::new(http, api_base, presentation_id, token)
    }
}

#[async_trait]
impl ItemSource for SlidesItemSource {
    async fn items(&self) -> Result<Vec<Item>, SourceError> {
        let response = self
            .http
            .get(self.endpoint.clone())
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|source| SourceError::Request {
                id: self.presentation_id.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                id: self.presentation_id.clone(),
                status: status.as_u16(),
            });
        }
        let body = response.bytes().await.map_err(|source| SourceError::Request {
            id: self.presentation_id.clone(),
            source,
        })?;
        let presentation: Presentation = serde_json::from_slice(&body)?;
        let items = items_from_presentation(&presentation);
        debug!(
            presentation = %self.presentation_id,
            slides = presentation.slides.len(),
            items = items.len(),
            "listed presentation"
        );
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flattens_elements_across_slides() {
        let presentation: Presentation = serde_json::from_value(json!({
            "slides": [
                { "pageElements": [
                    { "image": { "contentUrl": "https://img/a" } },
                    { "shape": { "shapeType": "TEXT_BOX" } }
                ]},
                { },
                { "pageElements": [
                    { "shape": { "shapeProperties": { "shapeBackgroundFill": {
                        "stretchedPictureProperties": { "contentUrl": "https://img/b" }
                    }}}}
                ]}
            ]
        }))
        .unwrap();

        assert_eq!(
            items_from_presentation(&presentation),
            vec![
                Item::new(0, 1, Some("https://img/a".into())),
                Item::new(1, 1, None),
                Item::new(2, 3, Some("https://img/b".into())),
            ]
        );
    }

    #[test]
    fn endpoint_targets_presentation() {
        let source =
            SlidesItemSource::new(Client::new(), "https://slides.example/", "deck-1", "t").unwrap();
        assert_eq!(
            source.endpoint.as_str(),
            "https://slides.example/v1/presentations/deck-1"
        );
    }
}
