//! ## Emoji trie
//!
//! A codepoint trie keyed by UTF-16 code units, used to find the longest
//! emoji sequence starting at a given position in a message.
//!
//! The bundled table is loaded once, on first use of [`EmojiTrie::global`].
//! Custom tables in the same `emoji-test.txt` format can be loaded
//! with [`EmojiTrie::from_table`].

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt::Display;

/// Base URL for emoji images.
pub const TWEMOJI_BASE_URL: &str = "https://cdn.jsdelivr.net/gh/jdecked/twemoji@latest/assets/svg";

static GLOBAL: Lazy<EmojiTrie> = Lazy::new(|| {
  match EmojiTrie::from_table(include_str!("../data/emoji-test.txt")) {
    Ok(trie) => {
      trace!(emojis = trie.len(), "loaded emoji table");
      trie
    }
    Err(e) => {
      warn!("failed to load bundled emoji table: {e}");
      EmojiTrie::new()
    }
  }
});

/// Data stored for a complete emoji sequence.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EmojiLeaf {
  key: String,
  name: String,
  depth: u32,
}

generate_getters! {
  for EmojiLeaf as self {
    /// Lowercase hex codepoints joined by `-`, e.g. `1f3f3-fe0f-200d-26a7-fe0f`.
    key -> &str = self.key.as_str(),

    /// CLDR short name, e.g. `transgender flag`.
    name -> &str = self.name.as_str(),

    /// Index of the last code unit of the sequence, counting from zero.
    ///
    /// A match at `i` covers `i..=i + depth`.
    depth -> u32,
  }
}

impl EmojiLeaf {
  /// Image URL of this emoji.
  ///
  /// Image files are named without `fe0f`, unless the sequence contains a ZWJ.
  pub fn url(&self) -> String {
    if self.key.contains("200d") {
      return format!("{TWEMOJI_BASE_URL}/{}.svg", self.key);
    }
    let file = self
      .key
      .split('-')
      .filter(|cp| *cp != "fe0f")
      .collect::<Vec<_>>()
      .join("-");
    format!("{TWEMOJI_BASE_URL}/{file}.svg")
  }
}

type NodeId = u32;

const ROOT: NodeId = 0;

#[derive(Clone, Debug)]
enum Node {
  Leaf(EmojiLeaf),
  Block {
    leaf: Option<EmojiLeaf>,
    children: HashMap<u16, NodeId>,
  },
}

impl Node {
  fn empty() -> Self {
    Node::Block {
      leaf: None,
      children: HashMap::new(),
    }
  }

  fn leaf(&self) -> Option<&EmojiLeaf> {
    match self {
      Node::Leaf(leaf) => Some(leaf),
      Node::Block { leaf, .. } => leaf.as_ref(),
    }
  }

  fn child(&self, unit: u16) -> Option<NodeId> {
    match self {
      Node::Leaf(_) => None,
      Node::Block { children, .. } => children.get(&unit).copied(),
    }
  }
}

/// Codepoint trie over UTF-16 code units.
///
/// Nodes live in an arena and refer to their children by index.
/// Immutable once built, and safe to share between threads.
#[derive(Clone, Debug)]
pub struct EmojiTrie {
  nodes: Vec<Node>,
  len: usize,
}

impl Default for EmojiTrie {
  fn default() -> Self {
    Self::new()
  }
}

impl EmojiTrie {
  /// An empty trie.
  pub fn new() -> Self {
    Self {
      nodes: vec![Node::empty()],
      len: 0,
    }
  }

  /// The trie built from the bundled emoji table.
  pub fn global() -> &'static EmojiTrie {
    &GLOBAL
  }

  /// Build a trie from a table in the Unicode `emoji-test.txt` format.
  ///
  /// ```text,ignore
  /// 1F638 ; fully-qualified # 😸 E0.6 grinning cat with smiling eyes
  /// ```
  ///
  /// Only `fully-qualified` entries are inserted.
  pub fn from_table(table: &str) -> Result<Self, EmojiTableError> {
    let mut trie = Self::new();
    let mut units = Vec::with_capacity(16);
    for (i, line) in table.lines().enumerate() {
      let line_no = i + 1;
      let line = line.trim();
      if line.is_empty() || line.starts_with('#') {
        continue;
      }

      let (codepoints, rest) = line.split_once(';').ok_or(EmojiTableError {
        line: line_no,
        kind: EmojiTableErrorKind::MissingStatus,
      })?;
      let (status, comment) = rest.split_once('#').unwrap_or((rest, ""));
      if status.trim() != "fully-qualified" {
        continue;
      }

      units.clear();
      let mut key = String::with_capacity(codepoints.len());
      for hex in codepoints.split_whitespace() {
        let c = u32::from_str_radix(hex, 16)
          .ok()
          .and_then(char::from_u32)
          .ok_or_else(|| EmojiTableError {
            line: line_no,
            kind: EmojiTableErrorKind::InvalidCodepoint(hex.to_string()),
          })?;
        let mut buf = [0u16; 2];
        units.extend_from_slice(c.encode_utf16(&mut buf));
        if !key.is_empty() {
          key.push('-');
        }
        key.push_str(&hex.to_ascii_lowercase());
      }
      if units.is_empty() {
        return Err(EmojiTableError {
          line: line_no,
          kind: EmojiTableErrorKind::MissingCodepoints,
        });
      }

      // `# 😸 E0.6 grinning cat with smiling eyes`
      let name = comment
        .trim()
        .splitn(3, ' ')
        .nth(2)
        .unwrap_or_default()
        .to_string();

      trie.insert(&units, key, name);
    }

    Ok(trie)
  }

  /// Insert one emoji sequence.
  ///
  /// Inserting a sequence that extends an existing shorter one turns the
  /// shorter one's leaf into a block which keeps the leaf data.
  pub fn insert(&mut self, units: &[u16], key: impl Into<String>, name: impl Into<String>) {
    if units.is_empty() {
      return;
    }

    let mut current = ROOT;
    for &unit in units {
      current = self.child_or_insert(current, unit);
    }

    let leaf = EmojiLeaf {
      key: key.into(),
      name: name.into(),
      depth: (units.len() - 1) as u32,
    };
    let is_new = self.nodes[current as usize].leaf().is_none();
    match &mut self.nodes[current as usize] {
      Node::Block { leaf: slot, children } if !children.is_empty() => *slot = Some(leaf),
      node => *node = Node::Leaf(leaf),
    }
    if is_new {
      self.len += 1;
    }
  }

  fn child_or_insert(&mut self, parent: NodeId, unit: u16) -> NodeId {
    if let Some(id) = self.nodes[parent as usize].child(unit) {
      return id;
    }

    let id = self.nodes.len() as NodeId;
    self.nodes.push(Node::empty());

    let slot = &mut self.nodes[parent as usize];
    if let Node::Leaf(leaf) = slot {
      let leaf = std::mem::take(leaf);
      *slot = Node::Block {
        leaf: Some(leaf),
        children: HashMap::new(),
      };
    }
    if let Node::Block { children, .. } = slot {
      children.insert(unit, id);
    }

    id
  }

  /// Find the longest emoji sequence starting at `start`.
  ///
  /// Returns `None` if `start` is out of bounds, or if no sequence starts
  /// with the code unit at `start`. This is the longest match from this
  /// position only; callers scanning a whole message retry at every index.
  pub fn lookup(&self, units: &[u16], start: usize) -> Option<&EmojiLeaf> {
    let rest = units.get(start..)?;

    let mut node = ROOT;
    let mut best = None;
    for &unit in rest {
      let Some(next) = self.nodes[node as usize].child(unit) else {
        break;
      };
      node = next;
      if let Some(leaf) = self.nodes[node as usize].leaf() {
        best = Some(leaf);
      }
    }

    best
  }

  /// Number of emoji sequences in the trie.
  pub fn len(&self) -> usize {
    self.len
  }

  /// Whether the trie contains no sequences.
  pub fn is_empty(&self) -> bool {
    self.len == 0
  }
}

static_assert_send!(EmojiTrie);
static_assert_sync!(EmojiTrie);

/// Failed to load an emoji table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmojiTableError {
  /// 1-based line number.
  pub line: usize,
  /// What is wrong with the line.
  pub kind: EmojiTableErrorKind,
}

/// See [`EmojiTableError`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EmojiTableErrorKind {
  /// The line has no `;` separating codepoints from the status.
  MissingStatus,
  /// The line has no codepoints.
  MissingCodepoints,
  /// A codepoint is not valid hex or not a valid scalar value.
  InvalidCodepoint(String),
}

impl Display for EmojiTableError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match &self.kind {
      EmojiTableErrorKind::MissingStatus => {
        write!(f, "invalid emoji table: line {}: missing status", self.line)
      }
      EmojiTableErrorKind::MissingCodepoints => {
        write!(f, "invalid emoji table: line {}: missing codepoints", self.line)
      }
      EmojiTableErrorKind::InvalidCodepoint(cp) => write!(
        f,
        "invalid emoji table: line {}: invalid codepoint `{cp}`",
        self.line
      ),
    }
  }
}

impl std::error::Error for EmojiTableError {}
