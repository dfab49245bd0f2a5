use std::{
    borrow::Borrow,
    cmp::{self, Ordering},
    mem,
    ops::{Bound, Deref, DerefMut, RangeBounds},
};

use rand::Rng;

use crate::depth::Depth;
use crate::error::Error;

/// OrderedTable manages a single instance of an in-memory ordered
/// symbol table using a [left-leaning-red-black][llrb] tree.
///
/// Every node carries the size of its subtree, which is what makes the
/// positional queries ([`rank`], [`select`], [`size_of_range`]) run in
/// O(log n) without touching more than one root-to-leaf path.
///
/// [llrb]: https://en.wikipedia.org/wiki/Left-leaning_red-black_tree
/// [`rank`]: OrderedTable::rank
/// [`select`]: OrderedTable::select
/// [`size_of_range`]: OrderedTable::size_of_range
#[derive(Clone)]
pub struct OrderedTable<K, V>
where
    K: Clone + Ord,
    V: Clone,
{
    name: String,
    root: Option<Box<Node<K, V>>>,
}

/// Different ways to construct a new OrderedTable instance.
impl<K, V> OrderedTable<K, V>
where
    K: Clone + Ord,
    V: Clone,
{
    /// Create an empty instance of OrderedTable, identified by `name`.
    /// Applications can choose unique names.
    pub fn new<S>(name: S) -> OrderedTable<K, V>
    where
        S: AsRef<str>,
    {
        OrderedTable {
            name: name.as_ref().to_string(),
            root: Default::default(),
        }
    }

    /// Create a new instance of OrderedTable and load it with entries
    /// from `iter`. If `iter` repeats a key, the last value wins.
    pub fn load_from<S, I>(name: S, iter: I) -> OrderedTable<K, V>
    where
        S: AsRef<str>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut table = OrderedTable::new(name);
        for (key, value) in iter {
            table.set(key, value);
        }
        table
    }
}

/// Maintenance API.
impl<K, V> OrderedTable<K, V>
where
    K: Clone + Ord,
    V: Clone,
{
    /// Identify this instance. Applications can choose unique names
    /// while creating OrderedTable instances.
    #[inline]
    pub fn id(&self) -> String {
        self.name.clone()
    }

    /// Return number of entries in this instance.
    #[inline]
    pub fn len(&self) -> usize {
        size(self.root.as_ref().map(Deref::deref))
    }

    /// Check whether this table is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Number of nodes on the longest root-to-leaf path. An empty
    /// table has height 0, a single node height 1. The black-balance
    /// invariant keeps this below 2·log2(n+1) + 1.
    pub fn height(&self) -> usize {
        Self::height_of(self.root.as_ref().map(Deref::deref))
    }

    /// Return quickly with basic statistics, only entries() and
    /// node_size() methods are valid with this statistics.
    pub fn stats(&self) -> Stats {
        Stats::new(self.len(), mem::size_of::<Node<K, V>>())
    }

    /// Validate the LLRB tree with the following rules:
    ///
    /// * From root to any leaf, no consecutive reds allowed in its path.
    /// * No red link may lean right.
    /// * Number of blacks should be same under left child and right child.
    /// * Make sure keys are in sorted order.
    /// * Every node's cached subtree size must agree with its children.
    /// * rank() and select() must be inverses over every entry.
    ///
    /// Additionally return full statistics on the tree. Refer to
    /// [`Stats`] for more information.
    pub fn validate(&self) -> Result<Stats, Error<K>> {
        let root = self.root.as_ref().map(Deref::deref);
        let mut stats = Stats::new(self.len(), mem::size_of::<Node<K, V>>());
        stats.set_depths(Depth::new());
        let blacks = Self::validate_tree(root, is_red(root), 0, 0, &mut stats)?;
        stats.set_blacks(blacks);
        self.validate_ranks()?;
        Ok(stats)
    }
}

/// Read operations on OrderedTable instance.
impl<K, V> OrderedTable<K, V>
where
    K: Clone + Ord,
    V: Clone,
{
    /// Get the value for key.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut node = self.root.as_ref().map(Deref::deref);
        while let Some(nref) = node {
            node = match nref.key.borrow().cmp(key) {
                Ordering::Less => nref.right_deref(),
                Ordering::Greater => nref.left_deref(),
                Ordering::Equal => return Some(nref.value.clone()),
            };
        }
        None
    }

    /// Check whether key is present in the table.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Return the smallest key.
    pub fn min(&self) -> Result<K, Error<K>> {
        let mut node = match self.root.as_ref().map(Deref::deref) {
            None => return Err(Error::EmptyTable),
            Some(node) => node,
        };
        while let Some(left) = node.left_deref() {
            node = left;
        }
        Ok(node.key.clone())
    }

    /// Return the largest key.
    pub fn max(&self) -> Result<K, Error<K>> {
        let mut node = match self.root.as_ref().map(Deref::deref) {
            None => return Err(Error::EmptyTable),
            Some(node) => node,
        };
        while let Some(right) = node.right_deref() {
            node = right;
        }
        Ok(node.key.clone())
    }

    /// Return the largest key less than or equal to `key`.
    pub fn floor<Q>(&self, key: &Q) -> Result<K, Error<K>>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        if self.is_empty() {
            return Err(Error::EmptyTable);
        }
        let node = Self::floor_node(self.root.as_ref().map(Deref::deref), key);
        node.map(|n| n.key.clone()).ok_or(Error::NoSuchKey)
    }

    /// Return the smallest key greater than or equal to `key`.
    pub fn ceiling<Q>(&self, key: &Q) -> Result<K, Error<K>>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        if self.is_empty() {
            return Err(Error::EmptyTable);
        }
        let node = Self::ceiling_node(self.root.as_ref().map(Deref::deref), key);
        node.map(|n| n.key.clone()).ok_or(Error::NoSuchKey)
    }

    /// Return the number of keys strictly less than `key`. The key
    /// itself need not be present.
    pub fn rank<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        Self::rank_of(self.root.as_ref().map(Deref::deref), key)
    }

    /// Return the key with exactly `rank` smaller keys, the inverse
    /// of [`rank`](OrderedTable::rank).
    pub fn select(&self, rank: usize) -> Result<K, Error<K>> {
        match self.root.as_ref().map(Deref::deref) {
            Some(root) if rank < root.size => Ok(Self::select_node(root, rank).key.clone()),
            Some(_) | None => Err(Error::InvalidRank(rank)),
        }
    }

    /// Return a uniformly random entry from this table.
    pub fn random<R: Rng>(&self, rng: &mut R) -> Option<(K, V)> {
        let root = self.root.as_ref().map(Deref::deref)?;
        let rank = rng.gen_range(0..root.size);
        let node = Self::select_node(root, rank);
        Some((node.key.clone(), node.value.clone()))
    }

    /// Return an iterator over all entries in this instance, in
    /// ascending key order.
    pub fn iter(&self) -> Iter<K, V> {
        let mut stack = vec![];
        push_left(self.root.as_ref().map(Deref::deref), &mut stack);
        Iter { stack }
    }

    /// Range over all entries from low to high, in ascending key
    /// order. The iterator borrows the tree and never mutates it.
    pub fn range<Q, R>(&self, range: R) -> Range<K, V>
    where
        K: Borrow<Q>,
        R: RangeBounds<Q>,
        Q: Ord + ToOwned<Owned = K> + ?Sized,
    {
        let low: Bound<K> = match range.start_bound() {
            Bound::Included(key) => Bound::Included(key.to_owned()),
            Bound::Excluded(key) => Bound::Excluded(key.to_owned()),
            Bound::Unbounded => Bound::Unbounded,
        };
        let high: Bound<K> = match range.end_bound() {
            Bound::Included(key) => Bound::Included(key.to_owned()),
            Bound::Excluded(key) => Bound::Excluded(key.to_owned()),
            Bound::Unbounded => Bound::Unbounded,
        };
        Range::new(self.root.as_ref().map(Deref::deref), low, high)
    }

    /// Return all keys with `lo <= key <= hi`, ascending, freshly
    /// computed on every call.
    pub fn keys<Q>(&self, lo: &Q, hi: &Q) -> Vec<K>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.pairs_range(lo, hi)
            .into_iter()
            .map(|(key, _)| key)
            .collect()
    }

    /// Return all entries in ascending key order.
    pub fn pairs(&self) -> Vec<(K, V)> {
        self.iter().collect()
    }

    /// Return all entries with `lo <= key <= hi` in ascending key
    /// order. Subtrees entirely outside the range are pruned.
    pub fn pairs_range<Q>(&self, lo: &Q, hi: &Q) -> Vec<(K, V)>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut acc = vec![];
        Self::scan_range(self.root.as_ref().map(Deref::deref), lo, hi, &mut acc);
        acc
    }

    /// Return the number of keys with `lo <= key <= hi`, in closed
    /// form from two rank queries instead of walking the range.
    pub fn size_of_range<Q>(&self, lo: &Q, hi: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        if lo.gt(hi) {
            return 0;
        }
        let span = self.rank(hi) - self.rank(lo);
        if self.contains(hi) {
            span + 1
        } else {
            span
        }
    }
}

type Insert<K, V> = (Box<Node<K, V>>, Option<Error<K>>);

type Upsert<K, V> = (Box<Node<K, V>>, Option<V>);

type Remove<K, V> = (Option<Box<Node<K, V>>>, V);

type Unlink<K, V> = (Option<Box<Node<K, V>>>, Box<Node<K, V>>);

/// Write operations on OrderedTable instance.
impl<K, V> OrderedTable<K, V>
where
    K: Clone + Ord,
    V: Clone,
{
    /// Create a new {key, value} entry in the table. If key is
    /// already present return error.
    pub fn create(&mut self, key: K, value: V) -> Result<(), Error<K>> {
        let (mut root, error) = Self::insert(self.root.take(), key, value);
        root.set_black();
        self.root = Some(root);
        match error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Set value for key. If there is an existing entry for key,
    /// overwrite the old value with new value and return the old
    /// value. Overwriting never changes the shape of the tree.
    pub fn set(&mut self, key: K, value: V) -> Option<V> {
        let (mut root, old_value) = Self::upsert(self.root.take(), key, value);
        root.set_black();
        self.root = Some(root);
        old_value
    }

    /// Delete key from this instance and return its value. If key is
    /// not present, then delete is effectively a no-op.
    pub fn delete<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        if !self.contains(key) {
            return None;
        }
        let mut root = self.root.take()?;
        // borrow a red from the root so the first move_red_* step has
        // something to push down.
        if !is_red(root.left_deref()) && !is_red(root.right_deref()) {
            root.set_red();
        }
        let (root, old_value) = Self::remove(root, key);
        self.root = root;
        if let Some(root) = self.root.as_mut() {
            root.set_black();
        }
        Some(old_value)
    }

    /// Remove the smallest entry and return it. Deleting from an
    /// empty table is an error, unlike deleting an absent key.
    pub fn delete_min(&mut self) -> Result<(K, V), Error<K>> {
        let mut root = self.root.take().ok_or(Error::EmptyTable)?;
        if !is_red(root.left_deref()) && !is_red(root.right_deref()) {
            root.set_red();
        }
        let (root, node) = Self::remove_min(root);
        self.root = root;
        if let Some(root) = self.root.as_mut() {
            root.set_black();
        }
        let node = *node;
        Ok((node.key, node.value))
    }

    /// Remove the largest entry and return it. Deleting from an
    /// empty table is an error, unlike deleting an absent key.
    pub fn delete_max(&mut self) -> Result<(K, V), Error<K>> {
        let mut root = self.root.take().ok_or(Error::EmptyTable)?;
        if !is_red(root.left_deref()) && !is_red(root.right_deref()) {
            root.set_red();
        }
        let (root, node) = Self::remove_max(root);
        self.root = root;
        if let Some(root) = self.root.as_mut() {
            root.set_black();
        }
        let node = *node;
        Ok((node.key, node.value))
    }
}

impl<K, V> OrderedTable<K, V>
where
    K: Clone + Ord,
    V: Clone,
{
    fn insert(node: Option<Box<Node<K, V>>>, key: K, value: V) -> Insert<K, V> {
        let mut node = match node {
            None => return (Node::new(key, value, false /*red*/), None),
            Some(node) => node,
        };
        match node.key.cmp(&key) {
            Ordering::Greater => {
                let (left, e) = Self::insert(node.left.take(), key, value);
                node.left = Some(left);
                (Self::balance(node), e)
            }
            Ordering::Less => {
                let (right, e) = Self::insert(node.right.take(), key, value);
                node.right = Some(right);
                (Self::balance(node), e)
            }
            Ordering::Equal => (Self::balance(node), Some(Error::OverwriteKey)),
        }
    }

    fn upsert(node: Option<Box<Node<K, V>>>, key: K, value: V) -> Upsert<K, V> {
        let mut node = match node {
            None => return (Node::new(key, value, false /*red*/), None),
            Some(node) => node,
        };
        match node.key.cmp(&key) {
            Ordering::Greater => {
                let (left, o) = Self::upsert(node.left.take(), key, value);
                node.left = Some(left);
                (Self::balance(node), o)
            }
            Ordering::Less => {
                let (right, o) = Self::upsert(node.right.take(), key, value);
                node.right = Some(right);
                (Self::balance(node), o)
            }
            Ordering::Equal => {
                let old_value = mem::replace(&mut node.value, value);
                (Self::balance(node), Some(old_value))
            }
        }
    }

    // Top-down deletion. The caller has already confirmed the key is
    // present, so every descent step lands on a live subtree.
    fn remove<Q>(mut node: Box<Node<K, V>>, key: &Q) -> Remove<K, V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        if node.key.borrow().gt(key) {
            if !is_red(node.left_deref()) && !is_red(node.left.as_ref().unwrap().left_deref()) {
                node = Self::move_red_left(node);
            }
            let (left, old_value) = Self::remove(node.left.take().unwrap(), key);
            node.left = left;
            (Some(Self::balance(node)), old_value)
        } else {
            if is_red(node.left_deref()) {
                node = Self::rotate_right(node);
            }
            if node.key.borrow().eq(key) && node.right.is_none() {
                let node = *node;
                return (None, node.value);
            }
            if !is_red(node.right_deref()) && !is_red(node.right.as_ref().unwrap().left_deref()) {
                node = Self::move_red_right(node);
            }
            if node.key.borrow().eq(key) {
                // replace with the successor, the minimum of the right
                // subtree, then delete that minimum from it.
                let (right, min) = Self::remove_min(node.right.take().unwrap());
                node.right = right;
                let min = *min;
                let old_value = mem::replace(&mut node.value, min.value);
                node.key = min.key;
                (Some(Self::balance(node)), old_value)
            } else {
                let (right, old_value) = Self::remove(node.right.take().unwrap(), key);
                node.right = right;
                (Some(Self::balance(node)), old_value)
            }
        }
    }

    fn remove_min(mut node: Box<Node<K, V>>) -> Unlink<K, V> {
        if node.left.is_none() {
            let right = node.right.take();
            return (right, node);
        }
        if !is_red(node.left_deref()) && !is_red(node.left.as_ref().unwrap().left_deref()) {
            node = Self::move_red_left(node);
        }
        let (left, min) = Self::remove_min(node.left.take().unwrap());
        node.left = left;
        (Some(Self::balance(node)), min)
    }

    // a red left link must be rotated away before testing for a
    // missing right child, since reds only ever lean left.
    fn remove_max(mut node: Box<Node<K, V>>) -> Unlink<K, V> {
        if is_red(node.left_deref()) {
            node = Self::rotate_right(node);
        }
        if node.right.is_none() {
            let left = node.left.take();
            return (left, node);
        }
        if !is_red(node.right_deref()) && !is_red(node.right.as_ref().unwrap().left_deref()) {
            node = Self::move_red_right(node);
        }
        let (right, max) = Self::remove_max(node.right.take().unwrap());
        node.right = right;
        (Some(Self::balance(node)), max)
    }

    fn floor_node<'a, Q>(node: Option<&'a Node<K, V>>, key: &Q) -> Option<&'a Node<K, V>>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let node = node?;
        match node.key.borrow().cmp(key) {
            Ordering::Equal => Some(node),
            Ordering::Greater => Self::floor_node(node.left_deref(), key),
            Ordering::Less => Self::floor_node(node.right_deref(), key).or(Some(node)),
        }
    }

    fn ceiling_node<'a, Q>(node: Option<&'a Node<K, V>>, key: &Q) -> Option<&'a Node<K, V>>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let node = node?;
        match node.key.borrow().cmp(key) {
            Ordering::Equal => Some(node),
            Ordering::Less => Self::ceiling_node(node.right_deref(), key),
            Ordering::Greater => Self::ceiling_node(node.left_deref(), key).or(Some(node)),
        }
    }

    fn rank_of<Q>(node: Option<&Node<K, V>>, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let node = match node {
            None => return 0,
            Some(node) => node,
        };
        match node.key.borrow().cmp(key) {
            Ordering::Greater => Self::rank_of(node.left_deref(), key),
            Ordering::Less => 1 + size(node.left_deref()) + Self::rank_of(node.right_deref(), key),
            Ordering::Equal => size(node.left_deref()),
        }
    }

    // Precondition: rank < node.size.
    fn select_node(node: &Node<K, V>, rank: usize) -> &Node<K, V> {
        let lsize = size(node.left_deref());
        match rank.cmp(&lsize) {
            Ordering::Equal => node,
            Ordering::Less => match node.left_deref() {
                Some(left) => Self::select_node(left, rank),
                None => panic!("select(): sizes out of sync, call the programmer"),
            },
            Ordering::Greater => match node.right_deref() {
                Some(right) => Self::select_node(right, rank - lsize - 1),
                None => panic!("select(): sizes out of sync, call the programmer"),
            },
        }
    }

    fn scan_range<Q>(node: Option<&Node<K, V>>, lo: &Q, hi: &Q, acc: &mut Vec<(K, V)>)
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let node = match node {
            None => return,
            Some(node) => node,
        };
        let (cmplo, cmphi) = (lo.cmp(node.key.borrow()), hi.cmp(node.key.borrow()));
        if cmplo == Ordering::Less {
            Self::scan_range(node.left_deref(), lo, hi, acc);
        }
        if cmplo != Ordering::Greater && cmphi != Ordering::Less {
            acc.push((node.key.clone(), node.value.clone()));
        }
        if cmphi == Ordering::Greater {
            Self::scan_range(node.right_deref(), lo, hi, acc);
        }
    }

    fn height_of(node: Option<&Node<K, V>>) -> usize {
        match node {
            None => 0,
            Some(node) => {
                1 + cmp::max(
                    Self::height_of(node.left_deref()),
                    Self::height_of(node.right_deref()),
                )
            }
        }
    }

    fn validate_tree(
        node: Option<&Node<K, V>>,
        fromred: bool,
        mut nb: usize,
        depth: usize,
        stats: &mut Stats,
    ) -> Result<usize, Error<K>> {
        let node = match node {
            None => {
                stats.depths.as_mut().unwrap().sample(depth);
                return Ok(nb);
            }
            Some(node) => node,
        };

        let red = !node.is_black();
        if fromred && red {
            return Err(Error::ConsecutiveReds);
        }
        if is_red(node.right_deref()) {
            return Err(Error::RightLeaningRed);
        }
        if !red {
            nb += 1;
        }
        let (left, right) = (node.left_deref(), node.right_deref());
        let lblacks = Self::validate_tree(left, red, nb, depth + 1, stats)?;
        let rblacks = Self::validate_tree(right, red, nb, depth + 1, stats)?;
        if lblacks != rblacks {
            let err = format!("left: {} right: {}", lblacks, rblacks);
            return Err(Error::UnbalancedBlacks(err));
        }
        let computed = 1 + size(left) + size(right);
        if node.size != computed {
            let err = format!("stored: {} computed: {}", node.size, computed);
            return Err(Error::SizeMismatch(err));
        }
        if let Some(left) = left {
            if left.key.ge(&node.key) {
                return Err(Error::SortError(left.key.clone(), node.key.clone()));
            }
        }
        if let Some(right) = right {
            if right.key.le(&node.key) {
                return Err(Error::SortError(right.key.clone(), node.key.clone()));
            }
        }
        Ok(lblacks)
    }

    fn validate_ranks(&self) -> Result<(), Error<K>> {
        for rank in 0..self.len() {
            let key = self.select(rank)?;
            let found = self.rank(&key);
            if found != rank {
                let err = format!("select: {} rank: {}", rank, found);
                return Err(Error::InconsistentRank(err));
            }
        }
        Ok(())
    }

    //--------- rotation routines ----------------

    //              (i)                       (i)
    //               |                         |
    //              node                       x
    //              /  \                      / \
    //             /    (r)                 (r)  \
    //            /       \                 /     \
    //          left       x             node      xr
    //                    / \            /  \
    //                  xl   xr       left   xl
    //
    fn rotate_left(mut node: Box<Node<K, V>>) -> Box<Node<K, V>> {
        if is_black(node.right_deref()) {
            panic!("rotate_left(): rotating a black link ? call the programmer");
        }
        let mut x = node.right.take().unwrap();
        node.right = x.left.take();
        x.black = node.black;
        node.set_red();
        x.size = node.size;
        node.size = 1 + size(node.left_deref()) + size(node.right_deref());
        x.left = Some(node);
        x
    }

    //              (i)                       (i)
    //               |                         |
    //              node                       x
    //              /  \                      / \
    //            (r)   \                   (r)  \
    //           /       \                 /      \
    //          x       right             xl      node
    //         / \                                / \
    //       xl   xr                             xr  right
    //
    fn rotate_right(mut node: Box<Node<K, V>>) -> Box<Node<K, V>> {
        if is_black(node.left_deref()) {
            panic!("rotate_right(): rotating a black link ? call the programmer");
        }
        let mut x = node.left.take().unwrap();
        node.left = x.right.take();
        x.black = node.black;
        node.set_red();
        x.size = node.size;
        node.size = 1 + size(node.left_deref()) + size(node.right_deref());
        x.right = Some(node);
        x
    }

    //        (x)                   (!x)
    //         |                     |
    //        node                  node
    //        / \                   / \
    //      (y) (z)              (!y) (!z)
    //     /      \              /      \
    //   left    right         left    right
    //
    // splits or merges a temporary 4-node.
    fn flip_colors(node: &mut Node<K, V>) {
        node.left.as_mut().unwrap().toggle_link();
        node.right.as_mut().unwrap().toggle_link();
        node.toggle_link();
    }

    // The local rebalancing step applied on the unwind of every
    // structural change. The three checks must run in this order,
    // each may enable the next.
    fn balance(mut node: Box<Node<K, V>>) -> Box<Node<K, V>> {
        if is_red(node.right_deref()) && !is_red(node.left_deref()) {
            node = Self::rotate_left(node);
        }
        let left = node.left_deref();
        if is_red(left) && is_red(left.unwrap().left_deref()) {
            node = Self::rotate_right(node);
        }
        if is_red(node.left_deref()) && is_red(node.right_deref()) {
            Self::flip_colors(node.deref_mut());
        }
        node.size = 1 + size(node.left_deref()) + size(node.right_deref());
        node
    }

    // Assuming node is red and both node.left and node.left.left are
    // black, make node.left or one of its children red.
    fn move_red_left(mut node: Box<Node<K, V>>) -> Box<Node<K, V>> {
        Self::flip_colors(node.deref_mut());
        if is_red(node.right.as_ref().unwrap().left_deref()) {
            node.right = Some(Self::rotate_right(node.right.take().unwrap()));
            node = Self::rotate_left(node);
            Self::flip_colors(node.deref_mut());
        }
        node
    }

    // Assuming node is red and both node.right and node.right.left
    // are black, make node.right or one of its children red.
    fn move_red_right(mut node: Box<Node<K, V>>) -> Box<Node<K, V>> {
        Self::flip_colors(node.deref_mut());
        if is_red(node.left.as_ref().unwrap().left_deref()) {
            node = Self::rotate_right(node);
            Self::flip_colors(node.deref_mut());
        }
        node
    }
}

// a missing link counts as black.
fn is_red<K, V>(node: Option<&Node<K, V>>) -> bool
where
    K: Clone + Ord,
    V: Clone,
{
    node.map_or(false, |node| !node.is_black())
}

fn is_black<K, V>(node: Option<&Node<K, V>>) -> bool
where
    K: Clone + Ord,
    V: Clone,
{
    node.map_or(true, |node| node.is_black())
}

fn size<K, V>(node: Option<&Node<K, V>>) -> usize
where
    K: Clone + Ord,
    V: Clone,
{
    node.map_or(0, |node| node.size)
}

// descend to the smallest key under `node`, stacking every node on
// the way for the in-order unwind.
fn push_left<'a, K, V>(mut node: Option<&'a Node<K, V>>, stack: &mut Vec<&'a Node<K, V>>)
where
    K: Clone + Ord,
    V: Clone,
{
    while let Some(nref) = node {
        stack.push(nref);
        node = nref.left_deref();
    }
}

/// In-order iterator over all entries, returned by
/// [`OrderedTable::iter`].
pub struct Iter<'a, K, V>
where
    K: Clone + Ord,
    V: Clone,
{
    stack: Vec<&'a Node<K, V>>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V>
where
    K: Clone + Ord,
    V: Clone,
{
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        push_left(node.right_deref(), &mut self.stack);
        Some((node.key.clone(), node.value.clone()))
    }
}

/// Bounded in-order iterator, returned by [`OrderedTable::range`].
pub struct Range<'a, K, V>
where
    K: Clone + Ord,
    V: Clone,
{
    root: Option<&'a Node<K, V>>,
    stack: Vec<&'a Node<K, V>>,
    low: Bound<K>,
    high: Bound<K>,
}

impl<'a, K, V> Range<'a, K, V>
where
    K: Clone + Ord,
    V: Clone,
{
    fn new(root: Option<&'a Node<K, V>>, low: Bound<K>, high: Bound<K>) -> Range<'a, K, V> {
        // seed the stack with the path to the first in-range key,
        // skipping whole subtrees below the low bound.
        let mut stack = vec![];
        let mut node = root;
        while let Some(nref) = node {
            let within = match &low {
                Bound::Unbounded => true,
                Bound::Included(low) => nref.key.ge(low),
                Bound::Excluded(low) => nref.key.gt(low),
            };
            node = if within {
                stack.push(nref);
                nref.left_deref()
            } else {
                nref.right_deref()
            };
        }
        Range {
            root,
            stack,
            low,
            high,
        }
    }

    /// Flip this range into a descending iterator over the same
    /// bounds, starting over from the high end.
    pub fn rev(self) -> Reverse<'a, K, V> {
        Reverse::new(self.root, self.low, self.high)
    }
}

impl<'a, K, V> Iterator for Range<'a, K, V>
where
    K: Clone + Ord,
    V: Clone,
{
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        push_left(node.right_deref(), &mut self.stack);
        let within = match &self.high {
            Bound::Unbounded => true,
            Bound::Included(high) => node.key.le(high),
            Bound::Excluded(high) => node.key.lt(high),
        };
        if within {
            Some((node.key.clone(), node.value.clone()))
        } else {
            self.stack.clear();
            None
        }
    }
}

/// Descending counterpart of [`Range`], returned by [`Range::rev`].
pub struct Reverse<'a, K, V>
where
    K: Clone + Ord,
    V: Clone,
{
    stack: Vec<&'a Node<K, V>>,
    low: Bound<K>,
}

impl<'a, K, V> Reverse<'a, K, V>
where
    K: Clone + Ord,
    V: Clone,
{
    fn new(root: Option<&'a Node<K, V>>, low: Bound<K>, high: Bound<K>) -> Reverse<'a, K, V> {
        let mut stack = vec![];
        let mut node = root;
        while let Some(nref) = node {
            let within = match &high {
                Bound::Unbounded => true,
                Bound::Included(high) => nref.key.le(high),
                Bound::Excluded(high) => nref.key.lt(high),
            };
            node = if within {
                stack.push(nref);
                nref.right_deref()
            } else {
                nref.left_deref()
            };
        }
        Reverse { stack, low }
    }

    fn push_right(&mut self, mut node: Option<&'a Node<K, V>>) {
        while let Some(nref) = node {
            self.stack.push(nref);
            node = nref.right_deref();
        }
    }
}

impl<'a, K, V> Iterator for Reverse<'a, K, V>
where
    K: Clone + Ord,
    V: Clone,
{
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.push_right(node.left_deref());
        let within = match &self.low {
            Bound::Unbounded => true,
            Bound::Included(low) => node.key.ge(low),
            Bound::Excluded(low) => node.key.gt(low),
        };
        if within {
            Some((node.key.clone(), node.value.clone()))
        } else {
            self.stack.clear();
            None
        }
    }
}

// Node corresponds to a single entry in an OrderedTable instance.
#[derive(Clone)]
pub(crate) struct Node<K, V>
where
    K: Clone + Ord,
    V: Clone,
{
    key: K,
    value: V,
    black: bool,                    // store: black or red
    size: usize,                    // store: count of nodes in this subtree
    left: Option<Box<Node<K, V>>>,  // store: left child
    right: Option<Box<Node<K, V>>>, // store: right child
}

// Primary operations on a single node.
impl<K, V> Node<K, V>
where
    K: Clone + Ord,
    V: Clone,
{
    fn new(key: K, value: V, black: bool) -> Box<Node<K, V>> {
        Box::new(Node {
            key,
            value,
            black,
            size: 1,
            left: None,
            right: None,
        })
    }

    #[inline]
    fn left_deref(&self) -> Option<&Node<K, V>> {
        self.left.as_ref().map(Deref::deref)
    }

    #[inline]
    fn right_deref(&self) -> Option<&Node<K, V>> {
        self.right.as_ref().map(Deref::deref)
    }

    #[inline]
    fn set_red(&mut self) {
        self.black = false
    }

    #[inline]
    fn set_black(&mut self) {
        self.black = true
    }

    #[inline]
    fn toggle_link(&mut self) {
        self.black = !self.black
    }

    #[inline]
    fn is_black(&self) -> bool {
        self.black
    }
}

/// Statistics on an [`OrderedTable`] instance. Serves two purposes:
///
/// * To get partial but quick statistics via [`OrderedTable::stats`].
/// * To get full statistics via [`OrderedTable::validate`].
#[derive(Default, Debug)]
pub struct Stats {
    entries: usize, // number of entries in the tree.
    node_size: usize,
    blacks: Option<usize>,
    depths: Option<Depth>,
}

impl Stats {
    fn new(entries: usize, node_size: usize) -> Stats {
        Stats {
            entries,
            node_size,
            blacks: Default::default(),
            depths: Default::default(),
        }
    }

    #[inline]
    fn set_blacks(&mut self, blacks: usize) {
        self.blacks = Some(blacks)
    }

    #[inline]
    fn set_depths(&mut self, depths: Depth) {
        self.depths = Some(depths)
    }

    /// Return number of entries in the table.
    #[inline]
    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Return the in-memory footprint of a single node, including the
    /// color, subtree-size and child-link overhead. Varies with the
    /// key and value types.
    #[inline]
    pub fn node_size(&self) -> usize {
        self.node_size
    }

    /// Return number of black links from root to any null link.
    /// Available only from [`OrderedTable::validate`].
    #[inline]
    pub fn blacks(&self) -> Option<usize> {
        self.blacks
    }

    /// Return [`Depth`] statistics. Available only from
    /// [`OrderedTable::validate`].
    pub fn depths(&self) -> Option<Depth> {
        match self.depths.as_ref() {
            Some(depths) if depths.samples() > 0 => Some(depths.clone()),
            Some(_) | None => None,
        }
    }
}
