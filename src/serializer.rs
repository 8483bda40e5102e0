//! Text XML output for decoded documents.
//!
//! `MxSerializer` writes the markup. `LineNumberSerializer` wraps any
//! `XmlSink` and places elements on the lines recorded in the binary
//! document, so that decoded files line up with the sources they were
//! compiled from.

use std::io::Write;
use quick_xml::escape::{escape, partial_escape};

use crate::error::Result;

/// Output settings of the text serializer.
#[derive(Debug, Clone)]
pub struct SerializerOptions {
    pub indent: String,
    pub line_separator: String,

    /* Label written in the XML declaration */
    pub encoding: String,

    /* `standalone` pseudo-attribute of the declaration, left out when None */
    pub standalone: Option<bool>,

    /* Escape attribute values. Off when values arrive already escaped */
    pub escape_attributes: bool,

    /* Follow the line numbers of the binary document (enable_line_opt) */
    pub line_alignment: bool,
}

impl Default for SerializerOptions {
    fn default() -> Self {
        SerializerOptions {
            indent: "    ".to_string(),
            line_separator: "\n".to_string(),
            encoding: "utf-8".to_string(),
            standalone: Some(false),
            escape_attributes: false,
            line_alignment: true,
        }
    }
}

/// Minimal set of operations a document is written through. Names are
/// already qualified (`android:name`). `line` is the source line of the
/// node, `-1` when unknown.
pub trait XmlSink {
    fn start_document(&mut self, line: i32) -> Result<()>;

    /// `namespaces` are the (prefix, uri) pairs declared on this element.
    fn start_tag(&mut self, line: i32, name: &str, namespaces: &[(String, String)]) -> Result<()>;

    fn attribute(&mut self, name: &str, value: &str) -> Result<()>;

    fn text(&mut self, line: i32, text: &str) -> Result<()>;

    fn end_tag(&mut self, line: i32, name: &str) -> Result<()>;

    fn end_document(&mut self) -> Result<()>;

    /// Nesting depth: number of open elements.
    fn depth(&self) -> usize;

    /// Close a pending start tag, then write a line separator followed by
    /// `indent_level` indentation units. `indent_level` None writes a bare
    /// separator.
    fn break_line(&mut self, indent_level: Option<usize>) -> Result<()>;

    /// Turn the serializer's own line breaking on or off.
    fn set_auto_indent(&mut self, auto_indent: bool);
}

/// Streaming XML writer. Elements without content are closed as ` />`,
/// nested elements are indented unless auto indentation is off.
pub struct MxSerializer<W: Write> {
    out: W,
    options: SerializerOptions,
    auto_indent: bool,
    depth: usize,
    seen_tag: bool,
    start_tag_incomplete: bool,
    after_text: bool,
}

impl<W: Write> MxSerializer<W> {
    pub fn new(out: W, options: SerializerOptions) -> Self {
        MxSerializer {
            out,
            options,
            auto_indent: true,
            depth: 0,
            seen_tag: false,
            start_tag_incomplete: false,
            after_text: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn close_start_tag(&mut self) -> Result<()> {
        if self.start_tag_incomplete {
            self.out.write_all(b">")?;
            self.start_tag_incomplete = false;
        }

        Ok(())
    }

    fn write_indent(&mut self, level: usize) -> Result<()> {
        self.out.write_all(self.options.line_separator.as_bytes())?;
        for _ in 0..level {
            self.out.write_all(self.options.indent.as_bytes())?;
        }

        Ok(())
    }
}

impl<W: Write> XmlSink for MxSerializer<W> {
    fn start_document(&mut self, _line: i32) -> Result<()> {
        let mut declaration = format!("<?xml version=\"1.0\" encoding=\"{}\"", self.options.encoding);
        if let Some(standalone) = self.options.standalone {
            declaration.push_str(if standalone { " standalone=\"yes\"" } else { " standalone=\"no\"" });
        }
        declaration.push_str("?>");
        self.out.write_all(declaration.as_bytes())?;

        Ok(())
    }

    fn start_tag(&mut self, _line: i32, name: &str, namespaces: &[(String, String)]) -> Result<()> {
        self.close_start_tag()?;
        if self.auto_indent && self.seen_tag {
            self.write_indent(self.depth)?;
        }

        write!(self.out, "<{}", name)?;
        for (prefix, uri) in namespaces {
            if prefix.is_empty() {
                write!(self.out, " xmlns=\"{}\"", escape(uri))?;
            } else {
                write!(self.out, " xmlns:{}=\"{}\"", prefix, escape(uri))?;
            }
        }

        self.depth += 1;
        self.seen_tag = true;
        self.start_tag_incomplete = true;
        self.after_text = false;
        Ok(())
    }

    fn attribute(&mut self, name: &str, value: &str) -> Result<()> {
        if self.options.escape_attributes {
            write!(self.out, " {}=\"{}\"", name, escape(value))?;
        } else {
            write!(self.out, " {}=\"{}\"", name, value)?;
        }

        Ok(())
    }

    fn text(&mut self, _line: i32, text: &str) -> Result<()> {
        self.close_start_tag()?;
        self.out.write_all(partial_escape(text).as_bytes())?;
        self.after_text = true;

        Ok(())
    }

    fn end_tag(&mut self, _line: i32, name: &str) -> Result<()> {
        self.depth = self.depth.saturating_sub(1);
        if self.start_tag_incomplete {
            self.out.write_all(b" />")?;
            self.start_tag_incomplete = false;
        } else {
            if self.auto_indent && !self.after_text {
                self.write_indent(self.depth)?;
            }
            write!(self.out, "</{}>", name)?;
        }
        self.after_text = false;

        Ok(())
    }

    fn end_document(&mut self) -> Result<()> {
        self.close_start_tag()?;
        self.out.flush()?;

        Ok(())
    }

    fn depth(&self) -> usize {
        self.depth
    }

    fn break_line(&mut self, indent_level: Option<usize>) -> Result<()> {
        self.close_start_tag()?;
        match indent_level {
            Some(level) => self.write_indent(level),
            None => {
                self.out.write_all(self.options.line_separator.as_bytes())?;
                Ok(())
            },
        }
    }

    fn set_auto_indent(&mut self, auto_indent: bool) {
        self.auto_indent = auto_indent;
    }
}

/// Decorator placing tags on their recorded source lines.
///
/// Before a tag on a later line, blank lines are emitted up to that line
/// and the tag is indented; a tag on the current line (or an earlier one)
/// follows the previous markup directly. A line number of `-1` switches the
/// decorator off for the rest of the document and the wrapped serializer
/// indents on its own again.
pub struct LineNumberSerializer<S: XmlSink> {
    inner: S,
    enabled: bool,
    cur_line: i32,
    first_tag: bool,

    /* Last start tag has no content yet and will be closed as ` />` */
    open_empty: bool,
}

impl<S: XmlSink> LineNumberSerializer<S> {
    pub fn new(mut inner: S) -> Self {
        inner.set_auto_indent(false);
        LineNumberSerializer {
            inner,
            enabled: true,
            cur_line: 1,
            first_tag: true,
            open_empty: false,
        }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn disable(&mut self) {
        if self.enabled {
            self.enabled = false;
            self.inner.set_auto_indent(true);
        }
    }

    fn move_to_line(&mut self, target_line: i32, indent_level: usize) -> Result<()> {
        if target_line < 0 {
            self.disable();
        }
        if !self.enabled {
            return Ok(());
        }

        if self.first_tag {
            while self.cur_line < target_line {
                self.inner.break_line(None)?;
                self.cur_line += 1;
            }
            self.first_tag = false;
        } else if self.cur_line < target_line {
            for _ in 0..(target_line - self.cur_line - 1) {
                self.inner.break_line(None)?;
            }
            self.inner.break_line(Some(indent_level))?;
            self.cur_line = target_line;
        }

        Ok(())
    }
}

impl<S: XmlSink> XmlSink for LineNumberSerializer<S> {
    fn start_document(&mut self, line: i32) -> Result<()> {
        if line < 0 {
            self.disable();
        }
        self.inner.start_document(line)
    }

    fn start_tag(&mut self, line: i32, name: &str, namespaces: &[(String, String)]) -> Result<()> {
        let depth = self.inner.depth();
        self.move_to_line(line, depth)?;
        self.open_empty = true;
        self.inner.start_tag(line, name, namespaces)
    }

    fn attribute(&mut self, name: &str, value: &str) -> Result<()> {
        self.inner.attribute(name, value)
    }

    fn text(&mut self, line: i32, text: &str) -> Result<()> {
        self.open_empty = false;
        self.inner.text(line, text)?;
        self.cur_line += text.matches('\n').count() as i32;

        Ok(())
    }

    fn end_tag(&mut self, line: i32, name: &str) -> Result<()> {
        if !self.open_empty {
            let depth = self.inner.depth().saturating_sub(1);
            self.move_to_line(line, depth)?;
        }
        self.open_empty = false;
        self.inner.end_tag(line, name)
    }

    fn end_document(&mut self) -> Result<()> {
        self.inner.end_document()
    }

    fn depth(&self) -> usize {
        self.inner.depth()
    }

    fn break_line(&mut self, indent_level: Option<usize>) -> Result<()> {
        self.cur_line += 1;
        self.inner.break_line(indent_level)
    }

    fn set_auto_indent(&mut self, auto_indent: bool) {
        self.inner.set_auto_indent(auto_indent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_sample<S: XmlSink>(sink: &mut S, lines: [i32; 5]) {
        let android = vec![("android".to_string(), "http://schemas.android.com/apk/res/android".to_string())];
        sink.start_document(lines[0]).unwrap();
        sink.start_tag(lines[0], "manifest", &android).unwrap();
        sink.attribute("package", "com.example").unwrap();
        sink.start_tag(lines[1], "uses-sdk", &[]).unwrap();
        sink.attribute("android:minSdkVersion", "21").unwrap();
        sink.end_tag(lines[1], "uses-sdk").unwrap();
        sink.start_tag(lines[2], "application", &[]).unwrap();
        sink.end_tag(lines[3], "application").unwrap();
        sink.end_tag(lines[4], "manifest").unwrap();
        sink.end_document().unwrap();
    }

    fn output(serializer: MxSerializer<Vec<u8>>) -> String {
        String::from_utf8(serializer.into_inner()).unwrap()
    }

    #[test]
    fn indents_without_line_numbers() {
        let mut serializer = MxSerializer::new(Vec::new(), SerializerOptions::default());
        write_sample(&mut serializer, [-1; 5]);
        assert_eq!(output(serializer), concat!(
            "<?xml version=\"1.0\" encoding=\"utf-8\" standalone=\"no\"?>",
            "<manifest xmlns:android=\"http://schemas.android.com/apk/res/android\" package=\"com.example\">\n",
            "    <uses-sdk android:minSdkVersion=\"21\" />\n",
            "    <application />\n",
            "</manifest>"));
    }

    #[test]
    fn follows_line_numbers() {
        let serializer = MxSerializer::new(Vec::new(), SerializerOptions::default());
        let mut lines = LineNumberSerializer::new(serializer);
        write_sample(&mut lines, [2, 4, 5, 5, 7]);
        assert_eq!(output(lines.into_inner()), concat!(
            "<?xml version=\"1.0\" encoding=\"utf-8\" standalone=\"no\"?>\n",
            "<manifest xmlns:android=\"http://schemas.android.com/apk/res/android\" package=\"com.example\">\n",
            "\n",
            "    <uses-sdk android:minSdkVersion=\"21\" />\n",
            "    <application />\n",
            "\n",
            "</manifest>"));
    }

    #[test]
    fn same_line_stays_inline() {
        let serializer = MxSerializer::new(Vec::new(), SerializerOptions::default());
        let mut lines = LineNumberSerializer::new(serializer);
        write_sample(&mut lines, [1, 1, 1, 1, 1]);
        assert_eq!(output(lines.into_inner()), concat!(
            "<?xml version=\"1.0\" encoding=\"utf-8\" standalone=\"no\"?>",
            "<manifest xmlns:android=\"http://schemas.android.com/apk/res/android\" package=\"com.example\">",
            "<uses-sdk android:minSdkVersion=\"21\" /><application /></manifest>"));
    }

    #[test]
    fn text_is_escaped_and_counted() {
        let options = SerializerOptions {
            escape_attributes: true,
            ..Default::default()
        };
        let serializer = MxSerializer::new(Vec::new(), options);
        let mut lines = LineNumberSerializer::new(serializer);
        lines.start_document(1).unwrap();
        lines.start_tag(1, "a", &[]).unwrap();
        lines.attribute("v", "x\"&y").unwrap();
        lines.text(1, "1 < 2\n").unwrap();
        lines.start_tag(2, "b", &[]).unwrap();
        lines.end_tag(2, "b").unwrap();
        lines.end_tag(2, "a").unwrap();
        lines.end_document().unwrap();
        assert_eq!(output(lines.into_inner()), concat!(
            "<?xml version=\"1.0\" encoding=\"utf-8\" standalone=\"no\"?>",
            "<a v=\"x&quot;&amp;y\">1 &lt; 2\n<b /></a>"));
    }
}
