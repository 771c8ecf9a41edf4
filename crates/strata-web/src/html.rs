use strata_core::{Element, StateContent};

/// Elements that never take children or a closing tag.
const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Minimal element builder; attribute values and text are escaped, `html`
/// children are inserted as given.
#[derive(Debug, Clone, Default)]
pub struct Tag {
    name: String,
    attrs: Vec<(String, Option<String>)>,
    inner: String,
}

impl Tag {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn attr(mut self, name: &str, value: impl AsRef<str>) -> Self {
        self.attrs
            .push((name.to_string(), Some(value.as_ref().to_string())));
        self
    }

    pub fn attr_if(self, cond: bool, name: &str, value: impl AsRef<str>) -> Self {
        if cond { self.attr(name, value) } else { self }
    }

    /// Boolean attribute, e.g. `hidden`.
    pub fn flag(mut self, name: &str) -> Self {
        self.attrs.push((name.to_string(), None));
        self
    }

    pub fn flag_if(self, cond: bool, name: &str) -> Self {
        if cond { self.flag(name) } else { self }
    }

    /// Adds a `class` attribute unless every class is blank.
    pub fn class(self, classes: &[&str]) -> Self {
        let joined = classes
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if joined.is_empty() {
            self
        } else {
            self.attr("class", joined)
        }
    }

    pub fn text(mut self, text: &str) -> Self {
        self.inner.push_str(&escape_html(text));
        self
    }

    pub fn html(mut self, html: &str) -> Self {
        self.inner.push_str(html);
        self
    }

    pub fn child(self, child: Tag) -> Self {
        let rendered = child.render();
        self.html(&rendered)
    }

    pub fn children<I: IntoIterator<Item = Tag>>(self, children: I) -> Self {
        children.into_iter().fold(self, Tag::child)
    }

    pub fn render(&self) -> String {
        let mut out = format!("<{}", self.name);
        for (name, value) in &self.attrs {
            match value {
                Some(v) => out.push_str(&format!(" {}=\"{}\"", name, escape_html(v))),
                None => out.push_str(&format!(" {name}")),
            }
        }
        out.push('>');
        if VOID_TAGS.contains(&self.name.as_str()) {
            return out;
        }
        out.push_str(&self.inner);
        out.push_str(&format!("</{}>", self.name));
        out
    }
}

pub fn render_content(content: &StateContent) -> String {
    match content {
        StateContent::Text(text) => escape_html(text),
        StateContent::Html(html) => html.clone(),
        StateContent::Element(element) => render_element(element),
    }
}

fn render_element(element: &Element) -> String {
    let tag = if is_valid_tag(&element.tag) {
        element.tag.as_str()
    } else {
        tracing::warn!(tag = %element.tag, "invalid element tag rendered as div");
        "div"
    };
    let mut out = Tag::new(tag);
    for (name, value) in &element.attrs {
        if is_valid_attr(name) {
            out = out.attr(name, value);
        }
    }
    let inner: String = element.children.iter().map(render_content).collect();
    out.html(&inner).render()
}

fn is_valid_tag(tag: &str) -> bool {
    !tag.is_empty()
        && tag.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn is_valid_attr(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':'))
}
