use std::fmt;

/// A fraction formatted as a percentage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Percent(pub f32);

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}%", 100.0 * self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Field {
    Int(i64),
    Float(f32),
    Percent(Percent),
    Text(String),
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(x) => write!(f, "{x}"),
            Self::Float(x) => write!(f, "{x:.4}"),
            Self::Percent(x) => write!(f, "{x}"),
            Self::Text(x) => write!(f, "{x}"),
        }
    }
}

/// Snapshot of one overrider's reportable state.
#[derive(Clone, Debug)]
pub struct Info {
    pub overrider: &'static str,
    pub name: String,
    pub fields: Vec<(&'static str, Field)>,
}

impl Info {
    pub fn field(&self, key: &str) -> Option<&Field> {
        self.fields.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }
}

/// Per-parameter records collected by the host, plus an optional aggregate
/// footer appended by an overrider class.
#[derive(Debug, Default)]
pub struct InfoTable {
    rows: Vec<Info>,
    footer: Option<String>,
}

impl InfoTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, info: Info) {
        self.rows.push(info);
    }

    pub fn rows(&self) -> &[Info] {
        &self.rows
    }

    pub fn column(&self, key: &str) -> Vec<&Field> {
        self.rows.iter().filter_map(|row| row.field(key)).collect()
    }

    pub fn set_footer(&mut self, footer: String) {
        self.footer = Some(footer);
    }

    pub fn footer(&self) -> Option<&str> {
        self.footer.as_deref()
    }
}

impl fmt::Display for InfoTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:-<72}", "")?;
        writeln!(f, "{: <26} {: <26} state", "parameter", "overrider")?;
        writeln!(f, "{:-<72}", "")?;

        for row in &self.rows {
            let state = row
                .fields
                .iter()
                .map(|(k, v)| format!("{k}: {v}"))
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(f, "{: <26} {: <26} {state}", row.name, row.overrider)?;
        }

        if let Some(footer) = &self.footer {
            writeln!(f, "{:-<72}", "")?;
            writeln!(f, "{footer}")?;
        }

        write!(f, "{:-<72}", "")
    }
}
