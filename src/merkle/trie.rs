//! Merkle Patricia Trie implementation.
//!
//! The trie is backed by a key-value store and loads only the nodes an
//! operation walks through:
//!
//! - `open` reads just the root node
//! - `get`, `insert` and `remove` resolve stored nodes along the key's path
//! - every in-memory node caches its reference until a change below it
//!   clears the cache, so `root_hash` re-hashes only the changed paths
//! - `commit` writes only the nodes created or changed since the last commit
//!
//! Child references follow Ethereum: a node whose encoding is shorter than
//! 32 bytes is embedded in its parent, larger nodes are stored under their
//! Keccak-256 hash. The root is always hashed.

use primitive_types::H256;
use thiserror::Error;

use super::node::{keccak256, Node, NodeHash, EMPTY_ROOT, HASH_SIZE};
use super::rlp_decode::RlpError;
use crate::store::{DbError, KeyValueStore};

/// Trie errors.
#[derive(Error, Debug)]
pub enum TrieError {
    #[error("Missing trie node {0:?}")]
    MissingNode(H256),
    #[error("Invalid node")]
    InvalidNode,
    #[error("Corrupted trie: node {0:?} does not match its hash")]
    Corrupted(H256),
    #[error("RLP error: {0}")]
    Rlp(#[from] RlpError),
    #[error("Database error: {0}")]
    Db(#[from] DbError),
}

/// A child pointer inside the in-memory trie.
#[derive(Debug)]
enum Link {
    /// A committed node that has not been read yet.
    Stored([u8; HASH_SIZE]),
    /// A node held in memory.
    Loaded(Box<TrieNode>),
}

#[derive(Debug)]
struct TrieNode {
    kind: NodeKind,
    /// Cached reference (None if dirty)
    hash: Option<NodeHash>,
    /// Not yet written to the store.
    dirty: bool,
}

#[derive(Debug)]
enum NodeKind {
    Leaf {
        path: Vec<u8>,
        value: Vec<u8>,
    },
    Extension {
        path: Vec<u8>,
        child: Link,
    },
    Branch {
        children: Box<[Option<Link>; 16]>,
        value: Option<Vec<u8>>,
    },
}

impl TrieNode {
    fn new(kind: NodeKind) -> Box<Self> {
        Box::new(Self {
            kind,
            hash: None,
            dirty: true,
        })
    }

    fn leaf(path: Vec<u8>, value: Vec<u8>) -> Box<Self> {
        Self::new(NodeKind::Leaf { path, value })
    }

    /// Marks the node as changed.
    fn touch(&mut self) {
        self.hash = None;
        self.dirty = true;
    }

    /// Builds the in-memory form of a decoded node. Embedded children are
    /// decoded right away; hashed children stay unresolved.
    fn from_node(node: Node, reference: NodeHash) -> Result<Box<Self>, TrieError> {
        let kind = match node {
            Node::Empty => return Err(TrieError::InvalidNode),
            Node::Leaf { path, value } => NodeKind::Leaf { path, value },
            Node::Extension { path, child } => NodeKind::Extension {
                path,
                child: Link::from_reference(child)?,
            },
            Node::Branch { children, value } => {
                let mut links: Box<[Option<Link>; 16]> = Box::default();
                let children: [Option<NodeHash>; 16] = *children;
                for (link, child) in links.iter_mut().zip(children) {
                    if let Some(child) = child {
                        *link = Some(Link::from_reference(child)?);
                    }
                }
                NodeKind::Branch {
                    children: links,
                    value,
                }
            }
        };
        Ok(Box::new(Self {
            kind,
            hash: Some(reference),
            dirty: false,
        }))
    }

    /// The encodable form, with children replaced by their references.
    fn to_node(&mut self) -> Node {
        match &mut self.kind {
            NodeKind::Leaf { path, value } => Node::leaf(path.clone(), value.clone()),
            NodeKind::Extension { path, child } => Node::extension(path.clone(), child.reference()),
            NodeKind::Branch { children, value } => {
                let mut refs: Box<[Option<NodeHash>; 16]> = Box::default();
                for (r, child) in refs.iter_mut().zip(children.iter_mut()) {
                    *r = child.as_mut().map(Link::reference);
                }
                Node::Branch {
                    children: refs,
                    value: value.clone(),
                }
            }
        }
    }

    fn encode(&mut self) -> Vec<u8> {
        self.to_node().encode()
    }

    /// Reference a parent stores for this node, computed once per change.
    fn reference(&mut self) -> NodeHash {
        if let Some(hash) = &self.hash {
            return hash.clone();
        }
        let hash = NodeHash::from_encoded(self.encode());
        self.hash = Some(hash.clone());
        hash
    }
}

impl Link {
    fn from_reference(reference: NodeHash) -> Result<Self, TrieError> {
        match reference {
            NodeHash::Hash(hash) => Ok(Link::Stored(hash)),
            NodeHash::Inline(encoded) => {
                let node = Node::decode(&encoded)?;
                Ok(Link::Loaded(TrieNode::from_node(node, NodeHash::Inline(encoded))?))
            }
        }
    }

    fn reference(&mut self) -> NodeHash {
        match self {
            Link::Stored(hash) => NodeHash::Hash(*hash),
            Link::Loaded(node) => node.reference(),
        }
    }

    /// Reads a stored node into memory.
    fn resolve(&mut self, db: &dyn KeyValueStore) -> Result<&mut TrieNode, TrieError> {
        if let Link::Stored(hash) = *self {
            *self = Link::Loaded(load_node(db, &hash)?);
        }
        match self {
            Link::Loaded(node) => Ok(&mut **node),
            Link::Stored(hash) => Err(TrieError::MissingNode(H256::from(*hash))),
        }
    }
}

/// Reads a node from the store, checking it against its hash.
fn load_node(db: &dyn KeyValueStore, hash: &[u8; HASH_SIZE]) -> Result<Box<TrieNode>, TrieError> {
    let encoded = db
        .get(hash)?
        .ok_or(TrieError::MissingNode(H256::from(*hash)))?;
    if keccak256(&encoded) != *hash {
        return Err(TrieError::Corrupted(H256::from(*hash)));
    }

    let node = Node::decode(&encoded)?;
    // A root shorter than 32 bytes is stored too, but a parent would embed it.
    let reference = if encoded.len() >= HASH_SIZE {
        NodeHash::Hash(*hash)
    } else {
        NodeHash::Inline(encoded)
    };
    TrieNode::from_node(node, reference)
}

/// A Merkle Patricia Trie over a key-value store.
///
/// Operations that may need to read nodes take the store they were committed
/// to. A trie created with [`MerkleTrie::new`] lives in memory until its
/// first `commit`.
#[derive(Debug)]
pub struct MerkleTrie {
    root: Option<Link>,
}

impl MerkleTrie {
    /// Creates a new empty trie.
    pub fn new() -> Self {
        Self { root: None }
    }

    /// Opens the trie committed under `root` in `db`.
    ///
    /// Only the root node is read. The empty root opens an empty trie
    /// without touching the store.
    pub fn open(root: &[u8; HASH_SIZE], db: &dyn KeyValueStore) -> Result<Self, TrieError> {
        if *root == EMPTY_ROOT {
            return Ok(Self::new());
        }
        Ok(Self {
            root: Some(Link::Loaded(load_node(db, root)?)),
        })
    }

    /// Returns true if the trie is empty.
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Gets a value by key.
    pub fn get(&self, db: &dyn KeyValueStore, key: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
        match &self.root {
            Some(root) => get_link(root, db, &key_to_nibbles(key)),
            None => Ok(None),
        }
    }

    /// Inserts a key-value pair. An empty value removes the key.
    pub fn insert(
        &mut self,
        db: &dyn KeyValueStore,
        key: &[u8],
        value: Vec<u8>,
    ) -> Result<(), TrieError> {
        if value.is_empty() {
            self.remove(db, key)?;
            return Ok(());
        }

        let path = key_to_nibbles(key);
        match &mut self.root {
            Some(root) => {
                insert_node(root.resolve(db)?, db, &path, value)?;
            }
            None => self.root = Some(Link::Loaded(TrieNode::leaf(path, value))),
        }
        Ok(())
    }

    /// Removes a key, returning its value.
    pub fn remove(
        &mut self,
        db: &dyn KeyValueStore,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, TrieError> {
        remove_at(&mut self.root, db, &key_to_nibbles(key))
    }

    /// Computes and returns the root hash.
    pub fn root_hash(&mut self) -> [u8; HASH_SIZE] {
        match &mut self.root {
            None => EMPTY_ROOT,
            Some(root) => match root.reference() {
                NodeHash::Hash(hash) => hash,
                NodeHash::Inline(encoded) => keccak256(&encoded),
            },
        }
    }

    /// Writes the nodes changed since the last commit to `db` and returns
    /// the root hash.
    ///
    /// Embedded nodes are written as part of their parent. The root is
    /// always stored under its hash, even when it is small.
    pub fn commit(&mut self, db: &dyn KeyValueStore) -> Result<[u8; HASH_SIZE], TrieError> {
        let root = self.root_hash();
        if let Some(Link::Loaded(node)) = &mut self.root {
            if node.dirty {
                commit_children(node, db)?;
                db.put(&root, &node.encode())?;
                node.dirty = false;
            }
        }
        Ok(root)
    }

    /// Reads every entry, loading the whole trie.
    pub fn entries(&self, db: &dyn KeyValueStore) -> Result<Vec<(Vec<u8>, Vec<u8>)>, TrieError> {
        let mut entries = Vec::new();
        if let Some(root) = &self.root {
            collect_link(root, db, &mut Vec::new(), &mut entries)?;
        }
        Ok(entries)
    }
}

impl Default for MerkleTrie {
    fn default() -> Self {
        Self::new()
    }
}

fn get_link(
    link: &Link,
    db: &dyn KeyValueStore,
    path: &[u8],
) -> Result<Option<Vec<u8>>, TrieError> {
    match link {
        Link::Loaded(node) => get_node(node, db, path),
        Link::Stored(hash) => get_node(&*load_node(db, hash)?, db, path),
    }
}

fn get_node(
    node: &TrieNode,
    db: &dyn KeyValueStore,
    path: &[u8],
) -> Result<Option<Vec<u8>>, TrieError> {
    match &node.kind {
        NodeKind::Leaf { path: leaf_path, value } => {
            Ok((leaf_path[..] == path[..]).then(|| value.clone()))
        }
        NodeKind::Extension { path: ext_path, child } => {
            if path.starts_with(ext_path) {
                get_link(child, db, &path[ext_path.len()..])
            } else {
                Ok(None)
            }
        }
        NodeKind::Branch { children, value } => match path.split_first() {
            None => Ok(value.clone()),
            Some((nibble, rest)) => match &children[*nibble as usize] {
                Some(child) => get_link(child, db, rest),
                None => Ok(None),
            },
        },
    }
}

/// Inserts below an in-memory node. Returns false if the key already held
/// `value`, in which case nothing is marked dirty.
fn insert_node(
    node: &mut TrieNode,
    db: &dyn KeyValueStore,
    path: &[u8],
    value: Vec<u8>,
) -> Result<bool, TrieError> {
    let changed = match &mut node.kind {
        NodeKind::Leaf {
            path: leaf_path,
            value: leaf_value,
        } if leaf_path[..] == path[..] => {
            if *leaf_value == value {
                false
            } else {
                *leaf_value = value;
                true
            }
        }
        NodeKind::Extension {
            path: ext_path,
            child,
        } if path.starts_with(ext_path) => {
            let rest = &path[ext_path.len()..];
            insert_node(child.resolve(db)?, db, rest, value)?
        }
        NodeKind::Branch {
            children,
            value: branch_value,
        } => match path.split_first() {
            None => {
                if branch_value.as_ref() == Some(&value) {
                    false
                } else {
                    *branch_value = Some(value);
                    true
                }
            }
            Some((nibble, rest)) => {
                let slot = &mut children[*nibble as usize];
                match slot {
                    Some(child) => insert_node(child.resolve(db)?, db, rest, value)?,
                    None => {
                        *slot = Some(Link::Loaded(TrieNode::leaf(rest.to_vec(), value)));
                        true
                    }
                }
            }
        },
        _ => {
            let kind = std::mem::replace(&mut node.kind, placeholder());
            node.kind = split(kind, path, value);
            true
        }
    };

    if changed {
        node.touch();
    }
    Ok(changed)
}

fn placeholder() -> NodeKind {
    NodeKind::Leaf {
        path: Vec::new(),
        value: Vec::new(),
    }
}

/// Replaces a leaf or extension whose path diverges from `path` with a
/// branch holding both, under an extension for any shared prefix.
fn split(kind: NodeKind, path: &[u8], value: Vec<u8>) -> NodeKind {
    let mut children: Box<[Option<Link>; 16]> = Box::default();
    let mut branch_value = None;

    let common = match kind {
        NodeKind::Leaf {
            path: leaf_path,
            value: leaf_value,
        } => {
            let common = common_prefix(&leaf_path, path);
            match leaf_path.get(common) {
                Some(&nibble) => {
                    let rest = leaf_path[common + 1..].to_vec();
                    children[nibble as usize] = Some(Link::Loaded(TrieNode::leaf(rest, leaf_value)));
                }
                None => branch_value = Some(leaf_value),
            }
            common
        }
        NodeKind::Extension {
            path: ext_path,
            child,
        } => {
            // A diverging extension keeps at least one nibble past `common`.
            let common = common_prefix(&ext_path, path);
            let rest = &ext_path[common + 1..];
            children[ext_path[common] as usize] = Some(if rest.is_empty() {
                child
            } else {
                Link::Loaded(TrieNode::new(NodeKind::Extension {
                    path: rest.to_vec(),
                    child,
                }))
            });
            common
        }
        branch @ NodeKind::Branch { .. } => return branch,
    };

    match path.get(common) {
        Some(&nibble) => {
            let rest = path[common + 1..].to_vec();
            children[nibble as usize] = Some(Link::Loaded(TrieNode::leaf(rest, value)));
        }
        None => branch_value = Some(value),
    }

    let branch = NodeKind::Branch {
        children,
        value: branch_value,
    };
    if common == 0 {
        branch
    } else {
        NodeKind::Extension {
            path: path[..common].to_vec(),
            child: Link::Loaded(TrieNode::new(branch)),
        }
    }
}

/// Removes `path` from the subtree in `slot`. A node left with a single
/// entry is merged with it.
fn remove_at(
    slot: &mut Option<Link>,
    db: &dyn KeyValueStore,
    path: &[u8],
) -> Result<Option<Vec<u8>>, TrieError> {
    let node = match slot {
        Some(link) => link.resolve(db)?,
        None => return Ok(None),
    };

    let removed = match &mut node.kind {
        NodeKind::Leaf {
            path: leaf_path,
            value,
        } => {
            if leaf_path[..] != path[..] {
                return Ok(None);
            }
            let value = std::mem::take(value);
            *slot = None;
            return Ok(Some(value));
        }
        NodeKind::Extension {
            path: ext_path,
            child,
        } => {
            if !path.starts_with(ext_path) {
                return Ok(None);
            }
            let mut child_slot = Some(std::mem::replace(child, Link::Stored(EMPTY_ROOT)));
            let removed = remove_at(&mut child_slot, db, &path[ext_path.len()..]);
            match child_slot {
                Some(restored) => *child = restored,
                None => {
                    *slot = None;
                    return removed;
                }
            }
            removed?
        }
        NodeKind::Branch { children, value } => match path.split_first() {
            None => value.take(),
            Some((nibble, rest)) => remove_at(&mut children[*nibble as usize], db, rest)?,
        },
    };

    if removed.is_some() {
        node.touch();
        collapse(node, db)?;
    }
    Ok(removed)
}

/// Restores the canonical shape of a node after a removal below it.
fn collapse(node: &mut TrieNode, db: &dyn KeyValueStore) -> Result<(), TrieError> {
    let kind = match &mut node.kind {
        NodeKind::Leaf { .. } => return Ok(()),
        NodeKind::Extension { path, child } => {
            if matches!(child.resolve(db)?.kind, NodeKind::Branch { .. }) {
                return Ok(());
            }
            let prefix = std::mem::take(path);
            prepend_path(prefix, std::mem::replace(child, Link::Stored(EMPTY_ROOT)))
        }
        NodeKind::Branch { children, value } => {
            let occupied = children.iter().filter(|child| child.is_some()).count();
            if occupied == 0 {
                match value.take() {
                    Some(value) => NodeKind::Leaf {
                        path: Vec::new(),
                        value,
                    },
                    None => return Ok(()),
                }
            } else if occupied == 1 && value.is_none() {
                let nibble = match children.iter().position(Option::is_some) {
                    Some(nibble) => nibble,
                    None => return Ok(()),
                };
                if let Some(child) = children[nibble].as_mut() {
                    child.resolve(db)?;
                }
                match children[nibble].take() {
                    Some(child) => prepend_path(vec![nibble as u8], child),
                    None => return Ok(()),
                }
            } else {
                return Ok(());
            }
        }
    };
    node.kind = kind;
    Ok(())
}

/// Puts `prefix` in front of a resolved child: leaves and extensions absorb
/// it into their path, a branch gets an extension above it.
fn prepend_path(mut prefix: Vec<u8>, child: Link) -> NodeKind {
    let node = match child {
        Link::Loaded(node) => node,
        stored => {
            return NodeKind::Extension {
                path: prefix,
                child: stored,
            }
        }
    };

    let TrieNode { kind, hash, dirty } = *node;
    match kind {
        NodeKind::Leaf { path, value } => {
            prefix.extend_from_slice(&path);
            NodeKind::Leaf {
                path: prefix,
                value,
            }
        }
        NodeKind::Extension { path, child } => {
            prefix.extend_from_slice(&path);
            NodeKind::Extension {
                path: prefix,
                child,
            }
        }
        kind => NodeKind::Extension {
            path: prefix,
            child: Link::Loaded(Box::new(TrieNode { kind, hash, dirty })),
        },
    }
}

/// Writes the dirty nodes below `node`, children first.
fn commit_children(node: &mut TrieNode, db: &dyn KeyValueStore) -> Result<(), TrieError> {
    match &mut node.kind {
        NodeKind::Leaf { .. } => {}
        NodeKind::Extension { child, .. } => commit_link(child, db)?,
        NodeKind::Branch { children, .. } => {
            for child in children.iter_mut().flatten() {
                commit_link(child, db)?;
            }
        }
    }
    Ok(())
}

fn commit_link(link: &mut Link, db: &dyn KeyValueStore) -> Result<(), TrieError> {
    if let Link::Loaded(node) = link {
        if node.dirty {
            commit_children(node, db)?;
            if let NodeHash::Hash(hash) = node.reference() {
                db.put(&hash, &node.encode())?;
            }
            node.dirty = false;
        }
    }
    Ok(())
}

fn collect_link(
    link: &Link,
    db: &dyn KeyValueStore,
    prefix: &mut Vec<u8>,
    entries: &mut Vec<(Vec<u8>, Vec<u8>)>,
) -> Result<(), TrieError> {
    match link {
        Link::Loaded(node) => collect_node(node, db, prefix, entries),
        Link::Stored(hash) => collect_node(&*load_node(db, hash)?, db, prefix, entries),
    }
}

fn collect_node(
    node: &TrieNode,
    db: &dyn KeyValueStore,
    prefix: &mut Vec<u8>,
    entries: &mut Vec<(Vec<u8>, Vec<u8>)>,
) -> Result<(), TrieError> {
    let depth = prefix.len();
    match &node.kind {
        NodeKind::Leaf { path, value } => {
            prefix.extend_from_slice(path);
            let key = nibbles_to_key(prefix);
            prefix.truncate(depth);
            entries.push((key?, value.clone()));
        }
        NodeKind::Extension { path, child } => {
            prefix.extend_from_slice(path);
            let result = collect_link(child, db, prefix, entries);
            prefix.truncate(depth);
            result?;
        }
        NodeKind::Branch { children, value } => {
            if let Some(value) = value {
                entries.push((nibbles_to_key(prefix)?, value.clone()));
            }
            for (nibble, child) in children.iter().enumerate() {
                if let Some(child) = child {
                    prefix.push(nibble as u8);
                    let result = collect_link(child, db, prefix, entries);
                    prefix.truncate(depth);
                    result?;
                }
            }
        }
    }
    Ok(())
}

fn common_prefix(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// Converts a key (bytes) to nibbles.
fn key_to_nibbles(key: &[u8]) -> Vec<u8> {
    let mut nibbles = Vec::with_capacity(key.len() * 2);
    for byte in key {
        nibbles.push(byte >> 4);
        nibbles.push(byte & 0x0F);
    }
    nibbles
}

/// Converts a full nibble path back to key bytes.
fn nibbles_to_key(nibbles: &[u8]) -> Result<Vec<u8>, TrieError> {
    if nibbles.len() % 2 != 0 {
        return Err(TrieError::InvalidNode);
    }
    Ok(nibbles.chunks(2).map(|pair| (pair[0] << 4) | pair[1]).collect())
}

// ============================================================================
// Merkle Proofs
// ============================================================================

/// A Merkle proof for a key-value inclusion.
///
/// Contains the sequence of nodes from root to the target key,
/// allowing verification without the full trie.
#[derive(Debug, Clone)]
pub struct MerkleProof {
    /// The key being proved.
    pub key: Vec<u8>,
    /// The value at the key (None for non-existence proofs).
    pub value: Option<Vec<u8>>,
    /// Proof nodes from root towards the key, embedded nodes included.
    pub proof: Vec<Node>,
}

impl MerkleTrie {
    /// Generates a Merkle proof for the given key.
    pub fn generate_proof(
        &mut self,
        db: &dyn KeyValueStore,
        key: &[u8],
    ) -> Result<MerkleProof, TrieError> {
        let target = key_to_nibbles(key);
        let mut proof = Vec::new();
        let value = match &mut self.root {
            Some(root) => prove_link(root, db, &target, &mut proof)?,
            None => None,
        };

        Ok(MerkleProof {
            key: key.to_vec(),
            value,
            proof,
        })
    }
}

/// Appends the nodes on the way to `path` and returns the value found there.
fn prove_link(
    link: &mut Link,
    db: &dyn KeyValueStore,
    path: &[u8],
    proof: &mut Vec<Node>,
) -> Result<Option<Vec<u8>>, TrieError> {
    let node = link.resolve(db)?;
    proof.push(node.to_node());
    match &mut node.kind {
        NodeKind::Leaf {
            path: leaf_path,
            value,
        } => Ok((leaf_path[..] == path[..]).then(|| value.clone())),
        NodeKind::Extension {
            path: ext_path,
            child,
        } => {
            if path.starts_with(ext_path) {
                prove_link(child, db, &path[ext_path.len()..], proof)
            } else {
                Ok(None)
            }
        }
        NodeKind::Branch { children, value } => match path.split_first() {
            None => Ok(value.clone()),
            Some((nibble, rest)) => match &mut children[*nibble as usize] {
                Some(child) => prove_link(child, db, rest, proof),
                None => Ok(None),
            },
        },
    }
}

impl MerkleProof {
    /// Verifies this proof against a given root hash.
    ///
    /// Walks the nodes from the root, checking that each one matches the
    /// reference held by its parent (its hash, or its encoding when it is
    /// embedded) and that the path ends in the claimed value (or proves
    /// its absence).
    pub fn verify(&self, root_hash: &[u8; HASH_SIZE]) -> bool {
        if self.proof.is_empty() {
            return *root_hash == EMPTY_ROOT && self.value.is_none();
        }

        let target = key_to_nibbles(&self.key);
        let last = self.proof.len() - 1;
        let mut expected = NodeHash::Hash(*root_hash);
        let mut depth = 0;

        for (i, node) in self.proof.iter().enumerate() {
            let encoded = node.encode();
            let matches = match &expected {
                NodeHash::Hash(hash) => keccak256(&encoded) == *hash,
                NodeHash::Inline(data) => encoded == *data,
            };
            if !matches {
                return false;
            }

            match node {
                Node::Empty => return i == last && self.value.is_none(),
                Node::Leaf { path, value } => {
                    if i != last {
                        return false;
                    }
                    return if target[depth..] == path[..] {
                        self.value.as_ref() == Some(value)
                    } else {
                        self.value.is_none()
                    };
                }
                Node::Extension { path, child } => {
                    let next = depth + path.len();
                    if target.len() < next || target[depth..next] != path[..] {
                        return i == last && self.value.is_none();
                    }
                    expected = child.clone();
                    depth = next;
                }
                Node::Branch { children, value } => {
                    if depth == target.len() {
                        return i == last && self.value == *value;
                    }
                    match &children[target[depth] as usize] {
                        Some(child) => {
                            expected = child.clone();
                            depth += 1;
                        }
                        None => return i == last && self.value.is_none(),
                    }
                }
            }
        }

        // The path continues past the last supplied node.
        false
    }

    /// Returns true if this is a proof of inclusion (key exists).
    pub fn is_inclusion(&self) -> bool {
        self.value.is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::store::{self, MemoryDb};

    /// A store that counts reads and writes.
    #[derive(Default)]
    struct CountingDb {
        inner: MemoryDb,
        reads: AtomicUsize,
        writes: AtomicUsize,
    }

    impl CountingDb {
        fn reads(&self) -> usize {
            self.reads.load(Ordering::Relaxed)
        }

        fn writes(&self) -> usize {
            self.writes.load(Ordering::Relaxed)
        }
    }

    impl KeyValueStore for CountingDb {
        fn get(&self, key: &[u8]) -> store::Result<Option<Vec<u8>>> {
            self.reads.fetch_add(1, Ordering::Relaxed);
            self.inner.get(key)
        }

        fn put(&self, key: &[u8], value: &[u8]) -> store::Result<()> {
            self.writes.fetch_add(1, Ordering::Relaxed);
            self.inner.put(key, value)
        }

        fn delete(&self, key: &[u8]) -> store::Result<()> {
            self.inner.delete(key)
        }
    }

    fn numbered_trie(db: &dyn KeyValueStore, count: u64) -> MerkleTrie {
        let mut trie = MerkleTrie::new();
        for i in 0..count {
            trie.insert(db, &i.to_be_bytes(), (i * 7 + 1).to_be_bytes().to_vec())
                .unwrap();
        }
        trie
    }

    #[test]
    fn test_empty_trie() {
        let mut trie = MerkleTrie::new();
        assert!(trie.is_empty());
        assert_eq!(trie.root_hash(), EMPTY_ROOT);
    }

    #[test]
    fn test_multiple_entries() {
        let db = MemoryDb::new();
        let mut trie = MerkleTrie::new();
        trie.insert(&db, b"do", b"verb".to_vec()).unwrap();
        trie.insert(&db, b"dog", b"puppy".to_vec()).unwrap();
        trie.insert(&db, b"doge", b"coin".to_vec()).unwrap();
        trie.insert(&db, b"horse", b"stallion".to_vec()).unwrap();

        assert_eq!(trie.get(&db, b"dog").unwrap(), Some(b"puppy".to_vec()));
        assert_eq!(trie.get(&db, b"do").unwrap(), Some(b"verb".to_vec()));
        assert_eq!(trie.get(&db, b"d").unwrap(), None);
        assert_eq!(trie.get(&db, b"dogs").unwrap(), None);
        assert_eq!(trie.entries(&db).unwrap().len(), 4);
        assert_ne!(trie.root_hash(), EMPTY_ROOT);
    }

    #[test]
    fn test_empty_value_removes() {
        let db = MemoryDb::new();
        let mut trie = MerkleTrie::new();
        trie.insert(&db, b"key1", b"value1".to_vec()).unwrap();
        let hash1 = trie.root_hash();

        trie.insert(&db, b"key2", b"value2".to_vec()).unwrap();
        assert_ne!(trie.root_hash(), hash1);

        trie.insert(&db, b"key2", Vec::new()).unwrap();
        assert_eq!(trie.get(&db, b"key2").unwrap(), None);
        assert_eq!(trie.root_hash(), hash1);
    }

    #[test]
    fn test_remove_collapses_to_single_leaf() {
        let db = MemoryDb::new();
        let mut single = MerkleTrie::new();
        single.insert(&db, b"doge", b"coin".to_vec()).unwrap();

        let mut trie = MerkleTrie::new();
        trie.insert(&db, b"do", b"verb".to_vec()).unwrap();
        trie.insert(&db, b"dog", b"puppy".to_vec()).unwrap();
        trie.insert(&db, b"doge", b"coin".to_vec()).unwrap();
        assert_eq!(trie.remove(&db, b"dog").unwrap(), Some(b"puppy".to_vec()));
        assert_eq!(trie.remove(&db, b"do").unwrap(), Some(b"verb".to_vec()));
        assert_eq!(trie.remove(&db, b"do").unwrap(), None);

        assert_eq!(trie.root_hash(), single.root_hash());
        assert_eq!(trie.remove(&db, b"doge").unwrap(), Some(b"coin".to_vec()));
        assert!(trie.is_empty());
    }

    #[test]
    fn test_deterministic_hash() {
        let db = MemoryDb::new();
        let mut trie1 = MerkleTrie::new();
        let mut trie2 = MerkleTrie::new();
        for i in 0..100u32 {
            trie1.insert(&db, &i.to_be_bytes(), format!("v{}", i).into_bytes()).unwrap();
        }
        for i in (0..100u32).rev() {
            trie2.insert(&db, &i.to_be_bytes(), format!("v{}", i).into_bytes()).unwrap();
        }
        assert_eq!(trie1.root_hash(), trie2.root_hash());
    }

    #[test]
    fn test_key_nibble_conversion() {
        let nibbles = key_to_nibbles(&[0xAB, 0xCD]);
        assert_eq!(nibbles, vec![0xA, 0xB, 0xC, 0xD]);
        assert_eq!(nibbles_to_key(&nibbles).unwrap(), vec![0xAB, 0xCD]);
        assert!(nibbles_to_key(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_commit_and_open() {
        let db = MemoryDb::new();
        let mut trie = numbered_trie(&db, 300);
        let root = trie.commit(&db).unwrap();
        assert_eq!(root, trie.root_hash());
        assert!(db.len() > 10);

        let reopened = MerkleTrie::open(&root, &db).unwrap();
        assert_eq!(reopened.entries(&db).unwrap().len(), 300);
        assert_eq!(
            reopened.get(&db, &42u64.to_be_bytes()).unwrap(),
            Some(295u64.to_be_bytes().to_vec())
        );
    }

    #[test]
    fn test_small_root_is_stored() {
        let db = MemoryDb::new();
        let mut trie = MerkleTrie::new();
        trie.insert(&db, b"k", b"v".to_vec()).unwrap();
        let root = trie.commit(&db).unwrap();
        // The lone leaf encodes to fewer than 32 bytes but is still the root.
        assert_eq!(db.len(), 1);

        let mut reopened = MerkleTrie::open(&root, &db).unwrap();
        assert_eq!(reopened.root_hash(), root);
        assert_eq!(reopened.get(&db, b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_open_reads_only_the_path() {
        let db = CountingDb::default();
        let root = numbered_trie(&db, 300).commit(&db).unwrap();

        let reads = db.reads();
        let trie = MerkleTrie::open(&root, &db).unwrap();
        assert_eq!(db.reads() - reads, 1);

        let reads = db.reads();
        trie.get(&db, &42u64.to_be_bytes()).unwrap();
        assert!(db.reads() - reads <= 4);
    }

    #[test]
    fn test_commit_writes_only_changed_path() {
        let db = CountingDb::default();
        let mut trie = numbered_trie(&db, 300);
        let root = trie.commit(&db).unwrap();
        let full = db.writes();
        assert!(full > 10);

        // Recommitting unchanged content writes nothing new.
        trie.commit(&db).unwrap();
        assert_eq!(db.writes(), full);

        let mut reopened = MerkleTrie::open(&root, &db).unwrap();
        reopened.insert(&db, &300u64.to_be_bytes(), b"new".to_vec()).unwrap();
        let writes = db.writes();
        let new_root = reopened.commit(&db).unwrap();
        let written = db.writes() - writes;
        assert!(written > 0 && written <= 4, "wrote {} nodes", written);
        assert_ne!(new_root, root);

        // Writing an unchanged value leaves the trie clean.
        reopened.insert(&db, &7u64.to_be_bytes(), 50u64.to_be_bytes().to_vec()).unwrap();
        let writes = db.writes();
        assert_eq!(reopened.commit(&db).unwrap(), new_root);
        assert_eq!(db.writes(), writes);
    }

    #[test]
    fn test_reopened_updates_match_fresh_build() {
        let db = MemoryDb::new();
        let root = numbered_trie(&db, 200).commit(&db).unwrap();

        let mut reopened = MerkleTrie::open(&root, &db).unwrap();
        let mut fresh = numbered_trie(&db, 200);
        for i in (0..200u64).step_by(3) {
            reopened.remove(&db, &i.to_be_bytes()).unwrap();
            fresh.remove(&db, &i.to_be_bytes()).unwrap();
        }
        for i in 200..260u64 {
            reopened.insert(&db, &i.to_be_bytes(), vec![0xAB; 40]).unwrap();
            fresh.insert(&db, &i.to_be_bytes(), vec![0xAB; 40]).unwrap();
        }

        let root = reopened.commit(&db).unwrap();
        assert_eq!(root, fresh.root_hash());

        let again = MerkleTrie::open(&root, &db).unwrap();
        assert_eq!(again.get(&db, &3u64.to_be_bytes()).unwrap(), None);
        assert_eq!(again.get(&db, &4u64.to_be_bytes()).unwrap(), Some(29u64.to_be_bytes().to_vec()));
        assert_eq!(again.get(&db, &250u64.to_be_bytes()).unwrap(), Some(vec![0xAB; 40]));
    }

    #[test]
    fn test_open_empty_root() {
        let db = MemoryDb::new();
        let trie = MerkleTrie::open(&EMPTY_ROOT, &db).unwrap();
        assert!(trie.is_empty());
    }

    #[test]
    fn test_open_missing_node() {
        let db = MemoryDb::new();
        let result = MerkleTrie::open(&[0x11; HASH_SIZE], &db);
        assert!(matches!(result, Err(TrieError::MissingNode(h)) if h == H256::repeat_byte(0x11)));
    }

    #[test]
    fn test_open_corrupted_node() {
        let db = MemoryDb::new();
        let mut trie = MerkleTrie::new();
        trie.insert(&db, b"key", b"value".to_vec()).unwrap();
        let root = trie.commit(&db).unwrap();

        db.put(&root, &Node::leaf(vec![1, 2], b"other".to_vec()).encode()).unwrap();
        assert!(matches!(MerkleTrie::open(&root, &db), Err(TrieError::Corrupted(_))));
    }

    #[test]
    fn test_missing_inner_node_fails_on_access() {
        let db = MemoryDb::new();
        let mut trie = MerkleTrie::new();
        trie.insert(&db, &[0x10], vec![0x01; 40]).unwrap();
        trie.insert(&db, &[0x20], vec![0x02; 40]).unwrap();
        let root = trie.commit(&db).unwrap();

        // Root branch plus two hashed leaves.
        assert_eq!(db.len(), 3);
        let leaf = Node::leaf(vec![0], vec![0x02; 40]);
        db.delete(&leaf.keccak()).unwrap();

        let mut reopened = MerkleTrie::open(&root, &db).unwrap();
        assert_eq!(reopened.get(&db, &[0x10]).unwrap(), Some(vec![0x01; 40]));
        assert!(matches!(
            reopened.get(&db, &[0x20]),
            Err(TrieError::MissingNode(h)) if h == H256::from(leaf.keccak())
        ));
        assert!(reopened.insert(&db, &[0x21], vec![0x03]).is_err());
    }

    #[test]
    fn test_proof_empty_trie() {
        let db = MemoryDb::new();
        let mut trie = MerkleTrie::new();
        let proof = trie.generate_proof(&db, b"key").unwrap();
        assert!(!proof.is_inclusion());
        assert!(proof.verify(&EMPTY_ROOT));
    }

    #[test]
    fn test_proof_inclusion_and_exclusion() {
        let db = MemoryDb::new();
        let mut trie = MerkleTrie::new();
        for i in 0..64u64 {
            trie.insert(&db, &i.to_be_bytes(), vec![i as u8 + 1; 40]).unwrap();
        }
        let root = trie.root_hash();

        let proof = trie.generate_proof(&db, &17u64.to_be_bytes()).unwrap();
        assert!(proof.is_inclusion());
        assert!(proof.verify(&root));

        let absent = trie.generate_proof(&db, &1000u64.to_be_bytes()).unwrap();
        assert!(!absent.is_inclusion());
        assert!(absent.verify(&root));

        // A tampered value no longer verifies.
        let mut forged = proof.clone();
        forged.value = Some(vec![0xff; 40]);
        assert!(!forged.verify(&root));
        assert!(!proof.verify(&[0u8; HASH_SIZE]));
    }

    #[test]
    fn test_proof_through_embedded_nodes() {
        let db = MemoryDb::new();
        let mut trie = MerkleTrie::new();
        trie.insert(&db, b"do", b"verb".to_vec()).unwrap();
        trie.insert(&db, b"dog", b"puppy".to_vec()).unwrap();
        trie.insert(&db, b"doge", b"coin".to_vec()).unwrap();
        trie.insert(&db, b"horse", b"stallion".to_vec()).unwrap();
        let root = trie.commit(&db).unwrap();

        let mut reopened = MerkleTrie::open(&root, &db).unwrap();
        let proof = reopened.generate_proof(&db, b"doge").unwrap();
        assert_eq!(proof.value, Some(b"coin".to_vec()));
        assert!(proof.proof.iter().any(|node| !node.hash().is_hash()));
        assert!(proof.verify(&root));

        let mut forged = proof.clone();
        forged.value = Some(b"cat".to_vec());
        assert!(!forged.verify(&root));
    }
}
