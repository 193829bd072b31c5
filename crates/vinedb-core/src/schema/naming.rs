use crate::{error::SchemaError, schema::table::Table};

/// Inserted between name segments everywhere.
pub const UNDERLINE: char = '_';

/// camelCase to underscore case: an uppercase letter flanked by
/// lowercase on both sides gets an underscore before it, then the
/// whole name is lowercased. `UserGroup` -> `user_group`,
/// `ABCGroup` -> `abcgroup`.
#[must_use]
pub fn camel_to_underline(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(chars.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if i > 0
            && i + 1 < chars.len()
            && c.is_uppercase()
            && chars[i - 1].is_lowercase()
            && chars[i + 1].is_lowercase()
        {
            out.push(UNDERLINE);
        }
        out.push(c);
    }
    out.to_lowercase()
}

/// Abbreviate an over-long identifier: keep the first underscore
/// segment verbatim, truncate every later segment to its first
/// character. Still too long afterwards is fatal — there is no retry.
pub fn shorten(name: &str, max_length: usize) -> Result<String, SchemaError> {
    let mut segments = name.split(UNDERLINE);
    let mut out = segments.next().unwrap_or_default().to_string();
    for segment in segments {
        out.push(UNDERLINE);
        if let Some(first) = segment.chars().next() {
            out.push(first);
        }
    }
    if out.len() > max_length {
        return Err(SchemaError::NameTooLong { name: out });
    }
    Ok(out)
}

///
/// NamingConfig
///
/// Per-category prefixes plus the dialect identifier length cap.
///

#[derive(Clone, Debug)]
pub struct NamingConfig {
    pub node_prefix: String,
    pub node_pk_prefix: String,
    pub event_prefix: String,
    pub event_pk_prefix: String,
    pub index_prefix: String,
    pub attr_prefix: String,
    pub prop_prefix: String,
    pub redundancy_prop_prefix: String,
    pub max_length: usize,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            node_prefix: "N_".to_string(),
            node_pk_prefix: "PK_N_".to_string(),
            event_prefix: "E_".to_string(),
            event_pk_prefix: "PK_E_".to_string(),
            index_prefix: "I_".to_string(),
            attr_prefix: "A_".to_string(),
            prop_prefix: "P_".to_string(),
            redundancy_prop_prefix: "R_".to_string(),
            max_length: 30,
        }
    }
}

///
/// NameStrategy
///
/// One interface per dialect naming scheme, selected by configuration.
///

pub trait NameStrategy {
    fn node_table(&self, node: &str) -> String;
    fn node_pk(&self, node: &str) -> String;
    fn event_table(&self, event: &str, left: &str, right: &str) -> String;
    fn event_pk(&self, event: &str, left: &str, right: &str) -> String;
    fn attr_column(&self, attr: &str) -> String;
    fn prop_column(&self, prop: &str) -> String;
    fn redundancy_prop_column(&self, prop: &str) -> String;
    fn index_of_table(&self, table: &str) -> String;

    /// Enforce the length cap over every generated table-level
    /// identifier, abbreviating where needed. An abbreviation that
    /// collides with another identifier of the same kind is fatal.
    fn check_names(&self, tables: &mut [Table]) -> Result<(), SchemaError>;
}

///
/// PrefixNaming
///
/// The one shipped strategy: category prefix + underscore-cased,
/// upper-cased name.
///

#[derive(Clone, Debug, Default)]
pub struct PrefixNaming {
    pub config: NamingConfig,
}

impl PrefixNaming {
    #[must_use]
    pub const fn new(config: NamingConfig) -> Self {
        Self { config }
    }

    fn prefixed(prefix: &str, name: &str) -> String {
        format!("{prefix}{name}").to_uppercase()
    }

    fn event_name(event: &str, left: &str, right: &str) -> String {
        format!(
            "{}{UNDERLINE}{}{UNDERLINE}{}",
            camel_to_underline(left),
            event,
            camel_to_underline(right)
        )
    }

    fn dedup_kind(
        names: &mut [(usize, String)],
        kind: &'static str,
        max_length: usize,
    ) -> Result<(), SchemaError> {
        for i in 0..names.len() {
            if names[i].1.len() > max_length {
                let original = names[i].1.clone();
                names[i].1 = shorten(&original, max_length)?;
                let shortened = names[i].1.clone();
                if names.iter().filter(|(_, n)| *n == shortened).count() > 1 {
                    return Err(SchemaError::NameCollision {
                        kind,
                        original,
                        shortened,
                    });
                }
            }
        }
        Ok(())
    }
}

impl NameStrategy for PrefixNaming {
    fn node_table(&self, node: &str) -> String {
        Self::prefixed(&self.config.node_prefix, &camel_to_underline(node))
    }

    fn node_pk(&self, node: &str) -> String {
        Self::prefixed(&self.config.node_pk_prefix, &camel_to_underline(node))
    }

    fn event_table(&self, event: &str, left: &str, right: &str) -> String {
        Self::prefixed(
            &self.config.event_prefix,
            &Self::event_name(event, left, right),
        )
    }

    fn event_pk(&self, event: &str, left: &str, right: &str) -> String {
        Self::prefixed(
            &self.config.event_pk_prefix,
            &Self::event_name(event, left, right),
        )
    }

    fn attr_column(&self, attr: &str) -> String {
        let name = attr.strip_prefix(vinedb_schema::ATTR_MARKER).unwrap_or(attr);
        Self::prefixed(&self.config.attr_prefix, &camel_to_underline(name))
    }

    fn prop_column(&self, prop: &str) -> String {
        Self::prefixed(&self.config.prop_prefix, &camel_to_underline(prop))
    }

    fn redundancy_prop_column(&self, prop: &str) -> String {
        Self::prefixed(
            &self.config.redundancy_prop_prefix,
            &camel_to_underline(prop),
        )
    }

    fn index_of_table(&self, table: &str) -> String {
        Self::prefixed(&self.config.index_prefix, table)
    }

    fn check_names(&self, tables: &mut [Table]) -> Result<(), SchemaError> {
        let max = self.config.max_length;

        let mut names: Vec<(usize, String)> = tables
            .iter()
            .enumerate()
            .map(|(i, t)| (i, t.name.clone()))
            .collect();
        Self::dedup_kind(&mut names, "table", max)?;
        for (i, name) in names {
            if tables[i].name != name {
                tables[i].name = name;
                // unique-index name tracks the table name
                if tables[i].index_name.is_some() {
                    tables[i].index_name = Some(self.index_of_table(&tables[i].name));
                }
            }
        }

        let mut pks: Vec<(usize, String)> = tables
            .iter()
            .enumerate()
            .map(|(i, t)| (i, t.pk_name.clone()))
            .collect();
        Self::dedup_kind(&mut pks, "pk", max)?;
        for (i, name) in pks {
            tables[i].pk_name = name;
        }

        let mut indexes: Vec<(usize, String)> = tables
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.index_name.clone().map(|n| (i, n)))
            .collect();
        Self::dedup_kind(&mut indexes, "index", max)?;
        for (i, name) in indexes {
            tables[i].index_name = Some(name);
        }

        let mut seqs: Vec<(usize, String)> = tables
            .iter()
            .enumerate()
            .map(|(i, t)| (i, t.seq_name.clone()))
            .collect();
        Self::dedup_kind(&mut seqs, "sequence", max)?;
        for (i, name) in seqs {
            tables[i].seq_name = name;
        }

        Ok(())
    }
}
