//! HTML fragment parser.
//!
//! Parses template markup (and the output of raw interpolation) into a
//! [`Document`] fragment. This is a template parser, not a browser-grade one:
//! it understands elements, void and self-closing tags, attributes (quoted,
//! unquoted and boolean, with names containing `* : . @ #`), comments and a
//! handful of entities. Close tags close the nearest matching open element; a
//! stray close tag is ignored. `{{ ... }}` spans in text are kept verbatim even
//! when they contain `<` or `>`.

use crate::{
    dom::{Document, NodeId, is_void_element},
    error::Error,
};

/// Parses `markup` into a new fragment owned by `doc`.
///
/// # Errors
///
/// Fails on unterminated tags, comments and attribute values.
pub fn parse_fragment(doc: &Document, markup: &str) -> Result<NodeId, Error> {
    let fragment = doc.create_fragment();
    let mut parser = Parser {
        doc,
        src: markup,
        pos: 0,
        stack: vec![fragment],
    };
    parser.run()?;
    tracing::trace!(bytes = markup.len(), "parsed html fragment");
    Ok(fragment)
}

struct Parser<'a> {
    doc: &'a Document,
    src: &'a str,
    pos: usize,
    stack: Vec<NodeId>,
}

impl Parser<'_> {
    fn rest(&self) -> &str {
        &self.src[self.pos..]
    }

    fn current(&self) -> NodeId {
        // The fragment at the bottom is never popped.
        self.stack[self.stack.len() - 1]
    }

    fn append(&self, node: NodeId) -> Result<(), Error> {
        self.doc.append_child(self.current(), node)
    }

    fn run(&mut self) -> Result<(), Error> {
        while self.pos < self.src.len() {
            let rest = self.rest();
            if rest.starts_with("<!--") {
                self.comment()?;
            } else if rest.starts_with("</") {
                self.close_tag()?;
            } else if rest.starts_with('<')
                && rest[1..].starts_with(|c: char| c.is_ascii_alphabetic())
            {
                self.open_tag()?;
            } else {
                self.text()?;
            }
        }
        Ok(())
    }

    fn comment(&mut self) -> Result<(), Error> {
        let start = self.pos;
        let body = &self.src[start + 4..];
        let end = body
            .find("-->")
            .ok_or_else(|| Error::html(start, "unterminated comment"))?;
        let node = self.doc.create_comment(&body[..end]);
        self.append(node)?;
        self.pos = start + 4 + end + 3;
        Ok(())
    }

    fn text(&mut self) -> Result<(), Error> {
        let bytes = self.src.as_bytes();
        let start = self.pos;
        let mut i = start;
        while i < bytes.len() {
            if self.src[i..].starts_with("{{") {
                match self.src[i..].find("}}") {
                    Some(close) => {
                        i += close + 2;
                        // Swallow the third brace of a raw `}}}` close.
                        if bytes.get(i) == Some(&b'}') {
                            i += 1;
                        }
                        continue;
                    }
                    None => {
                        i = bytes.len();
                        break;
                    }
                }
            }
            if bytes[i] == b'<' && i > start {
                let next = &self.src[i..];
                if next.starts_with("</")
                    || next.starts_with("<!--")
                    || next[1..].starts_with(|c: char| c.is_ascii_alphabetic())
                {
                    break;
                }
            }
            i += 1;
        }
        let raw = &self.src[start..i];
        self.pos = i;
        let node = self.doc.create_text(&decode_entities(raw));
        self.append(node)
    }

    fn open_tag(&mut self) -> Result<(), Error> {
        let start = self.pos;
        self.pos += 1;
        let tag = self.take_name(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        let element = self.doc.create_element(&tag.to_ascii_lowercase());

        loop {
            self.skip_whitespace();
            let rest = self.rest();
            if rest.is_empty() {
                return Err(Error::html(start, format!("unterminated <{tag}> tag")));
            }
            if let Some(after) = rest.strip_prefix("/>") {
                self.pos = self.src.len() - after.len();
                self.append(element)?;
                return Ok(());
            }
            if rest.starts_with('>') {
                self.pos += 1;
                self.append(element)?;
                if !is_void_element(&tag) {
                    self.stack.push(element);
                }
                return Ok(());
            }
            let name = self.take_name(|c| !c.is_whitespace() && !matches!(c, '=' | '>' | '/'));
            if name.is_empty() {
                // A lone `/` inside a tag.
                self.pos += 1;
                continue;
            }
            self.skip_whitespace();
            let value = if self.rest().starts_with('=') {
                self.pos += 1;
                self.skip_whitespace();
                self.attribute_value(start)?
            } else {
                String::new()
            };
            self.doc.set_attribute(element, &name, &value)?;
        }
    }

    fn attribute_value(&mut self, tag_start: usize) -> Result<String, Error> {
        let rest = self.rest();
        match rest.chars().next() {
            Some(quote @ ('"' | '\'')) => {
                let body = &rest[1..];
                let end = body
                    .find(quote)
                    .ok_or_else(|| Error::html(tag_start, "unterminated attribute value"))?;
                let value = decode_entities(&body[..end]);
                self.pos += end + 2;
                Ok(value)
            }
            Some(_) => {
                let raw = self.take_name(|c| !c.is_whitespace() && c != '>');
                Ok(decode_entities(&raw))
            }
            None => Err(Error::html(tag_start, "missing attribute value")),
        }
    }

    fn close_tag(&mut self) -> Result<(), Error> {
        let start = self.pos;
        let body = &self.src[start + 2..];
        let end = body
            .find('>')
            .ok_or_else(|| Error::html(start, "unterminated close tag"))?;
        let name = body[..end].trim().to_ascii_lowercase();
        self.pos = start + 2 + end + 1;

        let matching = self.stack[1..]
            .iter()
            .rposition(|open| self.doc.tag(*open).as_deref() == Some(name.as_str()));
        if let Some(index) = matching {
            self.stack.truncate(index + 1);
        }
        Ok(())
    }

    fn take_name(&mut self, accept: impl Fn(char) -> bool) -> String {
        let rest = self.rest();
        let len = rest.find(|c: char| !accept(c)).unwrap_or(rest.len());
        let name = rest[..len].to_string();
        self.pos += len;
        name
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }
}

/// Replaces the supported character references.
#[must_use]
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    const ENTITIES: &[(&str, &str)] = &[
        ("&amp;", "&"),
        ("&lt;", "<"),
        ("&gt;", ">"),
        ("&quot;", "\""),
        ("&#39;", "'"),
        ("&apos;", "'"),
        ("&nbsp;", "\u{a0}"),
    ];
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(index) = rest.find('&') {
        out.push_str(&rest[..index]);
        rest = &rest[index..];
        match ENTITIES.iter().find(|(name, _)| rest.starts_with(name)) {
            Some((name, replacement)) => {
                out.push_str(replacement);
                rest = &rest[name.len()..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::NodeKind;

    #[test]
    fn parses_nested_elements_and_attributes() {
        let doc = Document::new();
        let fragment = parse_fragment(
            &doc,
            r##"<ul class="list"><li *for="item in items" by="item.id" @click.once="#pick(item)">{{ item.name }}</li></ul>"##,
        )
        .expect("parse");
        let ul = doc.first_child(fragment).expect("ul");
        assert_eq!(doc.tag(ul).as_deref(), Some("ul"));
        let li = doc.first_child(ul).expect("li");
        assert_eq!(
            doc.attributes(li),
            vec![
                ("*for".to_string(), "item in items".to_string()),
                ("by".to_string(), "item.id".to_string()),
                ("@click.once".to_string(), "#pick(item)".to_string()),
            ]
        );
        assert_eq!(doc.text_content(li), "{{ item.name }}");
    }

    #[test]
    fn keeps_comparisons_inside_interpolation() {
        let doc = Document::new();
        let fragment = parse_fragment(&doc, "<p>{{ a < b ? 'x' : 'y' }} and {{{ raw }}}</p>").expect("parse");
        let p = doc.first_child(fragment).expect("p");
        assert_eq!(doc.text_content(p), "{{ a < b ? 'x' : 'y' }} and {{{ raw }}}");
    }

    #[test]
    fn void_and_self_closing_tags_do_not_nest() {
        let doc = Document::new();
        let fragment = parse_fragment(&doc, "<div><input *bind=name><br/><x-item /><span>t</span></div>")
            .expect("parse");
        let div = doc.first_child(fragment).expect("div");
        let tags: Vec<_> = doc
            .children(div)
            .into_iter()
            .filter_map(|c| doc.tag(c))
            .collect();
        assert_eq!(tags, vec!["input", "br", "x-item", "span"]);
        let input = doc.first_child(div).expect("input");
        assert_eq!(doc.get_attribute(input, "*bind").as_deref(), Some("name"));
    }

    #[test]
    fn comments_and_entities() {
        let doc = Document::new();
        let fragment = parse_fragment(&doc, "<!-- note -->a &amp; b &lt;c&gt;").expect("parse");
        let children = doc.children(fragment);
        assert_eq!(doc.kind(children[0]), NodeKind::Comment);
        assert_eq!(doc.text(children[0]).as_deref(), Some(" note "));
        assert_eq!(doc.text(children[1]).as_deref(), Some("a & b <c>"));
    }

    #[test]
    fn reports_unterminated_markup() {
        let doc = Document::new();
        assert!(matches!(
            parse_fragment(&doc, "<div class=\"x"),
            Err(Error::Html { offset: 0, .. })
        ));
        assert!(parse_fragment(&doc, "<p>x</p><!-- open").is_err());
        assert!(parse_fragment(&doc, "<p").is_err());
    }

    #[test]
    fn stray_close_tags_are_ignored() {
        let doc = Document::new();
        let fragment = parse_fragment(&doc, "<b>x</i></b>y").expect("parse");
        assert_eq!(doc.inner_html(fragment), "<b>x</b>y");
    }
}
