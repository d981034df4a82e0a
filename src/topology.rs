//! Semantic Topology
//!
//! Builds a weighted, linked node structure from one request's tokens and
//! derives a deterministic 8-byte fingerprint from it. The topology is
//! request-scoped: it is built, fingerprinted, and discarded - never
//! persisted or shared.
//!
//! ## Design
//!
//! Each token's weight is the first four little-endian bytes of its SHA-256
//! digest, normalized to `[0, 1)`. Nodes own their children exclusively
//! (`Box` links), so the structure is a tree by construction. Traversals
//! use an explicit stack rather than recursion, keeping stack depth flat
//! for token-heavy inputs while preserving the recursive definition's
//! visit order.

use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Index of the left ownership link
pub const LINK_LEFT: usize = 0;
/// Index of the primary ownership link
pub const LINK_PRIMARY: usize = 1;
/// Index of the right ownership link (reserved; never populated by insertion)
pub const LINK_RIGHT: usize = 2;

/// Fixed-size topology fingerprint, used as the template-lookup key
pub type Fingerprint = [u8; 8];

/// One node of a request-scoped topology
#[derive(Debug)]
pub struct SemanticNode {
    /// The token text this node was built from
    pub token: String,

    /// Content-hash weight in `[0, 1)`
    pub weight: f32,

    /// How this node was linked relative to its predecessor: -1, 0, or +1
    pub direction: i8,

    /// Exclusive ownership links: left, primary, right
    pub links: [Option<Box<SemanticNode>>; 3],
}

impl SemanticNode {
    fn leaf(token: String, weight: f32) -> Box<SemanticNode> {
        Box::new(SemanticNode {
            token,
            weight,
            direction: 0,
            links: [None, None, None],
        })
    }
}

impl Drop for SemanticNode {
    // Default drop glue would recurse once per chain link; unwind the
    // ownership tree with an explicit stack instead.
    fn drop(&mut self) {
        let mut stack: Vec<Box<SemanticNode>> =
            self.links.iter_mut().filter_map(Option::take).collect();
        while let Some(mut node) = stack.pop() {
            stack.extend(node.links.iter_mut().filter_map(Option::take));
        }
    }
}

/// Token boundary predicate shared by the tokenizer and the entropy check:
/// Unicode whitespace or Unicode punctuation (category P), so fullwidth
/// marks like `，` and `。` separate tokens the same as their ASCII forms
pub(crate) fn is_separator(ch: char) -> bool {
    static SEPARATOR: OnceLock<Regex> = OnceLock::new();
    let class = SEPARATOR.get_or_init(|| {
        Regex::new(r"[\s\p{P}]").expect("separator class compiles")
    });
    class.is_match(ch.encode_utf8(&mut [0u8; 4]))
}

/// Builds topologies and derives fingerprints
#[derive(Clone, Default)]
pub struct SemanticTopology;

impl SemanticTopology {
    pub fn new() -> Self {
        SemanticTopology
    }

    /// Build the topology for one input
    ///
    /// Tokens are maximal runs of non-separator characters. The first token
    /// starts the chain with direction 0; each subsequent token absorbs the
    /// running chain head - as its left child when strictly heavier
    /// (direction +1), as its primary child otherwise (direction -1) - and
    /// becomes the new head. Returns `None` when the input has no tokens.
    pub fn build_topology(&self, input: &str) -> Option<Box<SemanticNode>> {
        let mut head: Option<Box<SemanticNode>> = None;

        for token in tokenize(input) {
            let weight = token_weight(&token);
            let mut node = SemanticNode::leaf(token, weight);

            head = Some(match head {
                None => node,
                Some(current) => {
                    if weight > current.weight {
                        node.direction = 1;
                        node.links[LINK_LEFT] = Some(current);
                    } else {
                        node.direction = -1;
                        node.links[LINK_PRIMARY] = Some(current);
                    }
                    node
                }
            });
        }

        head
    }

    /// Diagnostic balance score: averages left and primary subtree balances
    /// with the node's signed weight, divided by 3. Never gates execution.
    pub fn topology_balance(&self, node: &SemanticNode) -> f32 {
        let mut balances: HashMap<*const SemanticNode, f32> = HashMap::new();
        for n in post_order(node) {
            let left = child_value(&balances, &n.links[LINK_LEFT]);
            let right = child_value(&balances, &n.links[LINK_PRIMARY]);
            let balance = (left + right + f32::from(n.direction) * n.weight) / 3.0;
            balances.insert(n as *const SemanticNode, balance);
        }
        balances[&(node as *const SemanticNode)]
    }

    /// Derive the 8-byte fingerprint
    ///
    /// Each node contributes its token bytes, a direction byte
    /// (`direction + 1`), a zero separator, and the fingerprints of its
    /// non-empty children in link order; the concatenation is SHA-256
    /// hashed and truncated to 8 bytes.
    pub fn topology_fingerprint(&self, node: &SemanticNode) -> Fingerprint {
        let mut fingerprints: HashMap<*const SemanticNode, Fingerprint> = HashMap::new();

        for n in post_order(node) {
            let mut buf = Vec::with_capacity(256);
            buf.extend_from_slice(n.token.as_bytes());
            buf.push((n.direction + 1) as u8);
            buf.push(0);
            for link in n.links.iter().flatten() {
                let child = link.as_ref() as *const SemanticNode;
                buf.extend_from_slice(&fingerprints[&child]);
            }

            let digest = Sha256::digest(&buf);
            let mut fp = [0u8; 8];
            fp.copy_from_slice(&digest[..8]);
            fingerprints.insert(n as *const SemanticNode, fp);
        }

        fingerprints[&(node as *const SemanticNode)]
    }
}

/// Split input into maximal non-separator runs
fn tokenize(input: &str) -> Vec<String> {
    input
        .split(is_separator)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// First four little-endian bytes of SHA-256(token), normalized to `[0, 1)`
fn token_weight(token: &str) -> f32 {
    let digest = Sha256::digest(token.as_bytes());
    let raw = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]);
    raw as f32 / u32::MAX as f32
}

/// Children-before-parent visit order, computed with an explicit stack
fn post_order(root: &SemanticNode) -> impl Iterator<Item = &SemanticNode> {
    let mut discovered = Vec::new();
    let mut stack = vec![root];
    while let Some(n) = stack.pop() {
        discovered.push(n);
        for link in n.links.iter().flatten() {
            stack.push(link);
        }
    }
    // Every child is discovered after its parent, so the reverse of the
    // discovery order processes children first.
    discovered.into_iter().rev()
}

fn child_value(
    values: &HashMap<*const SemanticNode, f32>,
    link: &Option<Box<SemanticNode>>,
) -> f32 {
    link.as_ref()
        .map(|child| values[&(child.as_ref() as *const SemanticNode)])
        .unwrap_or(0.0)
}
