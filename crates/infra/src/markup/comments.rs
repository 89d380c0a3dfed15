use harvest_core::domain::comments::{RawFields, RawItem, Snapshot};
use scraper::{ElementRef, Html};

use super::{CommentMarkup, MarkupError, extract_text, parse_selector};

/// Fields collected between one identifier span and the next.
struct PendingItem {
    id: String,
    author: Option<String>,
    time: Option<String>,
    first_div: Option<String>,
    div_after_time: Option<String>,
}

impl PendingItem {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            author: None,
            time: None,
            first_div: None,
            div_after_time: None,
        }
    }

    fn observe(&mut self, element: ElementRef<'_>, markup: &CommentMarkup) {
        let value = element.value();
        match value.name() {
            "span" if self.author.is_none() && value.attr(&markup.author_attr).is_some() => {
                self.author = Some(extract_text(element));
            }
            "span" if self.time.is_none() && value.attr(&markup.time_attr).is_some() => {
                self.time = Some(extract_text(element));
            }
            "div" if !contains_identifier(element, markup) => {
                if self.first_div.is_none() {
                    self.first_div = Some(extract_text(element));
                }
                if self.time.is_some() && self.div_after_time.is_none() {
                    self.div_after_time = Some(extract_text(element));
                }
            }
            _ => {}
        }
    }

    fn finish(self) -> RawItem {
        RawItem::new(
            self.id,
            RawFields {
                author: self.author,
                time: self.time,
                body: self.div_after_time.or(self.first_div),
            },
        )
    }
}

fn contains_identifier(element: ElementRef<'_>, markup: &CommentMarkup) -> bool {
    element
        .descendants()
        .filter_map(ElementRef::wrap)
        .any(|inner| inner.value().name() == "span" && inner.value().attr(&markup.id_attr).is_some())
}

/// Reads every rendered comment in page order. Fields of one comment are
/// looked up only between its identifier and the next identifier.
pub fn parse_comment_snapshot(html: &str, markup: &CommentMarkup) -> Result<Snapshot, MarkupError> {
    let document = Html::parse_document(html);
    let report_selector = parse_selector(&markup.report_selector)?;
    let root = document
        .select(&report_selector)
        .next()
        .unwrap_or_else(|| document.root_element());

    let mut items = Vec::new();
    let mut pending: Option<PendingItem> = None;
    for element in root.descendants().filter_map(ElementRef::wrap) {
        let value = element.value();
        if value.name() == "span" {
            if let Some(id) = value.attr(&markup.id_attr) {
                if let Some(done) = pending.take() {
                    items.push(done.finish());
                }
                pending = Some(PendingItem::new(id.trim()));
                continue;
            }
        }
        if let Some(current) = pending.as_mut() {
            current.observe(element, markup);
        }
    }
    if let Some(done) = pending {
        items.push(done.finish());
    }

    Ok(Snapshot {
        items,
        marker: parse_load_more_marker(&document, markup),
    })
}

/// Marker attribute of the first load-more button, if one is rendered.
pub fn parse_load_more_marker(document: &Html, markup: &CommentMarkup) -> Option<String> {
    let label = markup.load_more_label.as_str();
    document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|element| element.value().name() == "button")
        .find(|button| {
            let value = button.value();
            value.attr("data-title").is_some_and(|title| title.contains(label))
                || value.attr("aria-label").is_some_and(|aria| aria.contains(label))
                || button
                    .children()
                    .filter_map(|child| child.value().as_text())
                    .any(|text| text.contains(label))
        })
        .and_then(|button| button.value().attr(&markup.marker_attr))
        .map(|marker| marker.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = r#"
        <html><body>
        <div class="header"><span data-text="outside">ignored</span></div>
        <div class="report">
          <div class="msg">
            <span data-text="101"></span>
            <span data-author>Иван</span>
            <span data-tick>25 минут назад</span>
            <div class="body">  Не проходят
               платежи </div>
          </div>
          <div class="msg">
            <span data-text="102"></span>
            <span data-tick>17.12.2025, 03:46</span>
            <div class="body">Нет связи</div>
          </div>
          <div class="msg">
            <span data-text="103"></span>
            <span data-author>Ольга</span>
          </div>
          <div class="msg">
            <span data-text="104"></span>
            <span data-author>Пётр</span>
            <span data-tick>только что</span>
            <div>Всё лежит</div>
          </div>
          <button data-title="Показать ещё" data-last="1765931314342">Показать ещё</button>
        </div>
        </body></html>
    "#;

    #[test]
    fn items_come_in_page_order_inside_report() {
        let snapshot = parse_comment_snapshot(REPORT, &CommentMarkup::default()).unwrap();
        let ids: Vec<&str> = snapshot.items.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["101", "102", "103", "104"]);
        assert_eq!(snapshot.id_count(), 4);
    }

    #[test]
    fn fields_are_collected_per_item() {
        let snapshot = parse_comment_snapshot(REPORT, &CommentMarkup::default()).unwrap();
        let first = &snapshot.items[0].fields;
        assert_eq!(first.author.as_deref(), Some("Иван"));
        assert_eq!(first.time.as_deref(), Some("25 минут назад"));
        assert_eq!(first.body.as_deref(), Some("Не проходят платежи"));

        let second = &snapshot.items[1].fields;
        assert_eq!(second.author, None);
        assert_eq!(second.time.as_deref(), Some("17.12.2025, 03:46"));
    }

    #[test]
    fn fields_never_leak_from_the_next_item() {
        let snapshot = parse_comment_snapshot(REPORT, &CommentMarkup::default()).unwrap();
        let third = &snapshot.items[2].fields;
        assert_eq!(third.author.as_deref(), Some("Ольга"));
        assert_eq!(third.time, None);
        assert_eq!(third.body, None);
    }

    #[test]
    fn marker_comes_from_load_more_button() {
        let snapshot = parse_comment_snapshot(REPORT, &CommentMarkup::default()).unwrap();
        assert_eq!(snapshot.marker.as_deref(), Some("1765931314342"));
    }

    #[test]
    fn missing_report_falls_back_to_whole_page() {
        let html = r#"<div><span data-text="7"></span><span data-tick>1 час назад</span><div>x</div></div>"#;
        let snapshot = parse_comment_snapshot(html, &CommentMarkup::default()).unwrap();
        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(snapshot.items[0].fields.body.as_deref(), Some("x"));
        assert_eq!(snapshot.marker, None);
    }

    #[test]
    fn button_found_by_aria_label() {
        let html = r#"<div class="report"><button aria-label="Показать больше" data-last="abc"></button></div>"#;
        let snapshot = parse_comment_snapshot(html, &CommentMarkup::default()).unwrap();
        assert!(snapshot.items.is_empty());
        assert_eq!(snapshot.marker.as_deref(), Some("abc"));
    }

    #[test]
    fn invalid_report_selector_is_an_error() {
        let markup = CommentMarkup {
            report_selector: "div[".to_string(),
            ..CommentMarkup::default()
        };
        assert!(parse_comment_snapshot(REPORT, &markup).is_err());
    }
}
