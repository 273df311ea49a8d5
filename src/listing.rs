use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::models::Person;

/// Status filter value that selects people without a recognised status.
pub const UNKNOWN_FILTER: &str = "unknown";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PeopleFilter {
    pub search: Option<String>,
    pub status: Option<String>,
}

impl PeopleFilter {
    pub fn is_empty(&self) -> bool {
        blank(self.search.as_deref()) && blank(self.status.as_deref())
    }

    pub fn matches(&self, person: &Person) -> bool {
        self.matches_status(person) && self.matches_search(person)
    }

    fn matches_status(&self, person: &Person) -> bool {
        let Some(wanted) = self.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
            return true;
        };
        if wanted.eq_ignore_ascii_case(UNKNOWN_FILTER) {
            return person.recognized_status().is_none();
        }
        person
            .status
            .as_deref()
            .is_some_and(|status| status.trim().eq_ignore_ascii_case(wanted))
    }

    fn matches_search(&self, person: &Person) -> bool {
        let Some(needle) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
            return true;
        };
        let needle = needle.to_lowercase();
        [
            Some(person.name.as_str()),
            Some(person.id.as_str()),
            person.status.as_deref(),
            person.closure_classification.as_deref(),
        ]
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(&needle))
    }
}

fn blank(value: Option<&str>) -> bool {
    value.map(str::trim).map_or(true, str::is_empty)
}

/// Filtered people, newest first.
pub fn filter_people(people: Vec<Person>, filter: &PeopleFilter) -> Vec<Person> {
    let mut rows: Vec<Person> = people.into_iter().filter(|p| filter.matches(p)).collect();
    rows.sort_by(|a, b| b.created.cmp(&a.created).then_with(|| a.id.cmp(&b.id)));
    rows
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    id: &'a str,
    name: &'a str,
    status: &'a str,
    closure_classification: &'a str,
    created: String,
}

pub fn write_csv<W: Write>(writer: W, people: &[Person]) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for person in people {
        writer.serialize(CsvRow {
            id: &person.id,
            name: &person.name,
            status: person.status.as_deref().unwrap_or_default(),
            closure_classification: person.closure_classification.as_deref().unwrap_or_default(),
            created: person.created.to_rfc3339(),
        })?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::stub::person;
    use chrono::{Duration, Utc};

    fn sample() -> Vec<Person> {
        let now = Utc::now();
        let yesterday = now - Duration::days(1);
        let mut jules = person("rec2", Some("Closed"), Some("Closed After Call"), yesterday);
        jules.name = "Jules Moreno".into();
        let mut avery = person("rec1", Some("Lead"), None, now - Duration::days(2));
        avery.name = "Avery Lee".into();
        let mut kiara = person("rec3", Some("Interviewing"), None, now);
        kiara.name = "Kiara Patel".into();
        vec![avery, jules, kiara]
    }

    #[test]
    fn empty_filter_keeps_everyone_newest_first() {
        let filter = PeopleFilter::default();
        assert!(filter.is_empty());
        let ids: Vec<_> = filter_people(sample(), &filter).into_iter().map(|p| p.id).collect();
        assert_eq!(ids, ["rec3", "rec2", "rec1"]);
    }

    #[test]
    fn search_is_case_insensitive_across_fields() {
        let by_name = PeopleFilter { search: Some("avery".into()), status: None };
        assert_eq!(filter_people(sample(), &by_name).len(), 1);

        let by_reason = PeopleFilter { search: Some("AFTER CALL".into()), status: None };
        let rows = filter_people(sample(), &by_reason);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Jules Moreno");
    }

    #[test]
    fn status_filter_and_unknown_bucket() {
        let leads = PeopleFilter { search: None, status: Some("lead".into()) };
        assert_eq!(filter_people(sample(), &leads)[0].id, "rec1");

        let unknown = PeopleFilter { search: Some(" ".into()), status: Some("Unknown".into()) };
        let rows = filter_people(sample(), &unknown);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "rec3");
    }

    #[test]
    fn csv_export_has_header_and_rows() {
        let mut out = Vec::new();
        write_csv(&mut out, &sample()).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("id,name,status,closure_classification,created"));
        assert!(lines.next().unwrap().starts_with("rec1,Avery Lee,Lead,,"));
        assert_eq!(text.lines().count(), 4);
    }
}
