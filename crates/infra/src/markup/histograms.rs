use harvest_core::domain::widgets::{HistogramEntry, HistogramKind, normalize_percent};
use scraper::{ElementRef, Html, Selector};

use super::extract_text;

/// Region, cause and device percentages rendered next to the chart.
pub fn parse_histograms(html: &str) -> Vec<HistogramEntry> {
    let document = Html::parse_document(html);
    let region_selector = Selector::parse("label span.region").expect("selector");
    let cause_selector = Selector::parse("label span.cause").expect("selector");
    let device_selector = Selector::parse("div.os span[data-size]").expect("selector");

    let mut regions = Vec::new();
    let mut causes = Vec::new();
    let mut last_link: Option<ElementRef<'_>> = None;
    for element in document.root_element().descendants().filter_map(ElementRef::wrap) {
        if element.value().name() == "a" {
            last_link = Some(element);
            continue;
        }
        let kind = if region_selector.matches(&element) {
            HistogramKind::Region
        } else if cause_selector.matches(&element) {
            HistogramKind::Cause
        } else {
            continue;
        };
        let Some(percent) = element.value().attr("data-pos").and_then(normalize_percent) else {
            continue;
        };
        let name = last_link.map(extract_text).unwrap_or_default();
        let entry = HistogramEntry {
            kind,
            name,
            percent,
        };
        match kind {
            HistogramKind::Region => regions.push(entry),
            _ => causes.push(entry),
        }
    }

    let devices = document.select(&device_selector).filter_map(|span| {
        let text = extract_text(span);
        let (raw, name) = text.split_once('%')?;
        Some(HistogramEntry {
            kind: HistogramKind::Device,
            name: name.trim().to_string(),
            percent: normalize_percent(raw)?,
        })
    });

    regions.into_iter().chain(causes).chain(devices).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIDGETS: &str = r#"
        <section>
          <label><a href="/r/msk">Москва</a><span class="region" data-pos="45,5%"></span></label>
          <label><a href="/r/spb"> Санкт-Петербург </a><span class="region" data-pos=""></span></label>
          <label><a href="/c/app">Мобильное приложение</a><span class="cause" data-pos="60"></span></label>
          <div class="os">
            <span data-size="1">70% Android</span>
            <span data-size="2">30,5% iOS</span>
            <span data-size="3">нет данных</span>
          </div>
        </section>
    "#;

    #[test]
    fn regions_and_causes_take_preceding_link_name() {
        let entries = parse_histograms(WIDGETS);
        let regions: Vec<_> = entries
            .iter()
            .filter(|entry| entry.kind == HistogramKind::Region)
            .collect();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].name, "Москва");
        assert_eq!(regions[0].percent, 45.5);

        let cause = entries
            .iter()
            .find(|entry| entry.kind == HistogramKind::Cause)
            .unwrap();
        assert_eq!(cause.name, "Мобильное приложение");
        assert_eq!(cause.percent, 60.0);
    }

    #[test]
    fn devices_split_percent_and_name() {
        let devices: Vec<_> = parse_histograms(WIDGETS)
            .into_iter()
            .filter(|entry| entry.kind == HistogramKind::Device)
            .map(|entry| (entry.name, entry.percent))
            .collect();
        assert_eq!(
            devices,
            vec![("Android".to_string(), 70.0), ("iOS".to_string(), 30.5)]
        );
    }

    #[test]
    fn empty_page_has_no_entries() {
        assert!(parse_histograms("<html></html>").is_empty());
    }
}
