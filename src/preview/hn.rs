use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use regex::Regex;
use ego_tree::NodeRef;
use scraper::{Html, Node};
use serde::Deserialize;

use crate::preview::{Preview, Previewer};

const HN_API_URL: &str = "https://hacker-news.firebaseio.com/v0";

/// Parent walks longer than this are assumed to be broken data.
const MAX_ROOT_HOPS: usize = 64;

/// A Hacker News story or comment, as the Firebase API serves it. Absent
/// fields default so deleted and half-formed items still deserialize.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Item {
    #[serde(default, rename = "by")]
    pub author: String,
    #[serde(default, rename = "text")]
    pub body: String,
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub parent: Option<u64>,
    #[serde(default)]
    pub descendants: u32,
    #[serde(default)]
    pub kids: Vec<u64>,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub url: String,
}

/// Previews `news.ycombinator.com/item?id=N` links. Stories get their
/// score and comment count; comments get their body rendered to chat
/// text plus the story they hang under.
pub struct HackerNewsPreviewer {
    client: reqwest::Client,
    item_re: Regex,
    api_url: String,
}

impl HackerNewsPreviewer {
    pub fn new(item_re: Regex, api_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            item_re,
            api_url: api_url.unwrap_or_else(|| HN_API_URL.to_string()),
        }
    }

    /// The API answers `null` for ids that never existed.
    async fn fetch_item(&self, id: u64) -> Result<Option<Item>> {
        let url = format!("{}/item/{id}.json", self.api_url);

        self.client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("request for item {id} failed"))?
            .error_for_status()
            .context("item endpoint rejected the request")?
            .json::<Option<Item>>()
            .await
            .with_context(|| format!("item {id} was not valid JSON"))
    }

    /// Walk parent pointers up from a comment to the story it hangs
    /// under.
    async fn find_root(&self, item: &Item) -> Result<Item> {
        let mut current = item.clone();

        for _ in 0..MAX_ROOT_HOPS {
            let parent_id = current
                .parent
                .with_context(|| format!("item {} has no parent", current.id))?;

            let parent = self
                .fetch_item(parent_id)
                .await?
                .with_context(|| format!("parent item {parent_id} is missing"))?;

            debug!("item {} hangs under {} ({})", current.id, parent.id, parent.kind);

            match parent.kind.as_str() {
                "story" => return Ok(parent),
                "comment" => current = parent,
                other => bail!("unexpected item type {other:?} in parent chain"),
            }
        }

        bail!("gave up walking parents after {MAX_ROOT_HOPS} hops")
    }
}

#[async_trait]
impl Previewer for HackerNewsPreviewer {
    async fn preview(&self, url: &str) -> Result<Option<Preview>> {
        let Some(captures) = self.item_re.captures(url) else {
            return Ok(None);
        };

        let id: u64 = captures
            .get(1)
            .context("item pattern has no id capture")?
            .as_str()
            .parse()
            .context("item id out of range")?;

        let Some(item) = self.fetch_item(id).await? else {
            debug!("no such item {id}");
            return Ok(None);
        };

        match item.kind.as_str() {
            "story" => Ok(Some(Preview {
                text: format_story(&item),
            })),
            "comment" => {
                let root = self.find_root(&item).await?;
                Ok(Some(Preview {
                    text: format_comment(&item, &root),
                }))
            }
            other => {
                debug!("not previewing item {id} of type {other:?}");
                Ok(None)
            }
        }
    }
}

fn item_url(id: u64) -> String {
    format!("https://news.ycombinator.com/item?id={id}")
}

fn format_story(item: &Item) -> String {
    format!(
        "**{}**\n**{}** points. **{}** comments.\n\nthread: {}\ntarget: {}",
        item.title,
        item.score,
        item.descendants,
        item_url(item.id),
        item.url,
    )
}

fn format_comment(item: &Item, root: &Item) -> String {
    format!(
        "Comment on: **{}**\n**{}** replies. by **{}**\n\n{}\n\nthread: {}\ncomment: {}",
        root.title,
        item.kids.len(),
        item.author,
        render_body(&item.body).trim(),
        item_url(root.id),
        item_url(item.id),
    )
}

/// Render a comment body (an HTML fragment) as chat text: links become
/// their target, paragraphs become blank lines, code becomes a fenced
/// block, italics become `*italics*`, anything else is recursed through.
pub fn render_body(body: &str) -> String {
    let fragment = Html::parse_fragment(body);
    let mut out = String::new();
    render_children(fragment.tree.root(), &mut out);
    out
}

fn render_children(node: NodeRef<'_, Node>, out: &mut String) {
    for child in node.children() {
        render_node(child, out);
    }
}

fn render_node(node: NodeRef<'_, Node>, out: &mut String) {
    match node.value() {
        Node::Text(text) => out.push_str(&text),
        Node::Element(element) => match element.name() {
            "a" => {
                if let Some(href) = element.attr("href") {
                    out.push_str(href);
                }
            }
            "p" => {
                out.push_str("\n\n");
                render_children(node, out);
            }
            "code" => {
                out.push_str("```\n");
                render_children(node, out);
                out.push_str("```");
            }
            "i" => {
                out.push('*');
                render_children(node, out);
                out.push('*');
            }
            _ => render_children(node, out),
        },
        _ => render_children(node, out),
    }
}
