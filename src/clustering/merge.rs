use std::collections::{BTreeSet, HashMap};

use tracing::{debug, debug_span, trace};

use crate::dict::{Pronunciations, WordId};
use crate::lattice::{Lattice, LinkId, NodeId};
use crate::settings::settings;
use crate::similarity::{
    phonetic_similarity, relative_prob, time_overlap, time_overlap_ph, word_similarity,
};

use super::{Cluster, Clustering, Linkage, Relation, SimMatrix, Stage};

/// Similarity computations of one stage, with their memo tables.
struct Scorer<'a> {
    lat: &'a Lattice,
    prons: &'a Pronunciations,
    linkage: Linkage,
    constrained: bool,
    link_overlap: HashMap<(LinkId, LinkId), f64>,
    /// Keyed by word pair and whether phones were used.
    word_sim: HashMap<(WordId, WordId, bool), f64>,
    are_less: HashMap<(NodeId, NodeId), bool>,
}

impl<'a> Scorer<'a> {
    fn new(lat: &'a Lattice, prons: &'a Pronunciations, linkage: Linkage, constrained: bool) -> Self {
        Self {
            lat,
            prons,
            linkage,
            constrained,
            link_overlap: HashMap::new(),
            word_sim: HashMap::new(),
            are_less: HashMap::new(),
        }
    }

    fn aggregate(&self, values: impl Iterator<Item = f64>, pairs: usize) -> f64 {
        match self.linkage {
            Linkage::Max => values.fold(0.0, f64::max),
            Linkage::Avg if pairs == 0 => 0.0,
            Linkage::Avg => values.sum::<f64>() / pairs as f64,
        }
    }

    /// Posterior-weighted time overlap of the two clusters' links.
    fn compute_time_sim(&mut self, c1: &Cluster, c2: &Cluster) -> f64 {
        let lat = self.lat;
        if self.constrained {
            let b1 = lat.link(c1.best_link());
            let b2 = lat.link(c2.best_link());
            if lat.has_time_info() {
                let (s1, e1) = (lat.start_time(b1), lat.end_time(b1));
                let (s2, e2) = (lat.start_time(b2), lat.end_time(b2));
                if time_overlap(s1, e1, s2, e2) == 0.0 {
                    return 0.0;
                }
            } else {
                let (s1, e1) = lat.span(b1);
                let (s2, e2) = lat.span(b2);
                if time_overlap_ph(s1, e1, s2, e2) <= 0.0 {
                    return 0.0;
                }
            }
        }

        let total = lat.total_prob();
        let mut values = Vec::with_capacity(c1.no_links() * c2.no_links());
        for &l1 in c1.links() {
            let link1 = lat.link(l1);
            let p1 = relative_prob(link1.posterior, total);
            for &l2 in c2.links() {
                let link2 = lat.link(l2);
                let p2 = relative_prob(link2.posterior, total);
                let overlap = if lat.has_time_info() {
                    match self.link_overlap.get(&(l1, l2)) {
                        Some(&o) => o,
                        None => {
                            let o = time_overlap(
                                lat.start_time(link1),
                                lat.end_time(link1),
                                lat.start_time(link2),
                                lat.end_time(link2),
                            );
                            self.link_overlap.insert((l1, l2), o);
                            self.link_overlap.insert((l2, l1), o);
                            o
                        }
                    }
                } else {
                    1.0
                };
                values.push(p1 * p2 * overlap);
            }
        }
        let pairs = values.len();
        self.aggregate(values.into_iter(), pairs)
    }

    fn word_pair_sim(&mut self, w1: WordId, w2: WordId, use_phon: bool) -> f64 {
        if let Some(&s) = self.word_sim.get(&(w1, w2, use_phon)) {
            return s;
        }
        let (pron1, pron2) = (self.prons.pron(w1), self.prons.pron(w2));
        let s = if use_phon && !pron1.is_empty() && !pron2.is_empty() {
            phonetic_similarity(pron1, pron2)
        } else {
            word_similarity(self.prons.word(w1), self.prons.word(w2))
        };
        self.word_sim.insert((w1, w2, use_phon), s);
        self.word_sim.insert((w2, w1, use_phon), s);
        s
    }

    /// Posterior-weighted pronunciation (or spelling) similarity of the two
    /// clusters' words.
    fn compute_phon_sim(&mut self, c1: &Cluster, c2: &Cluster, use_phon: bool) -> f64 {
        if self.constrained
            && time_overlap_ph(c1.min_time(), c1.max_time(), c2.min_time(), c2.max_time()) < 0.0
        {
            return 0.0;
        }
        let total = self.lat.total_prob();
        let mut values = Vec::with_capacity(c1.word_posteriors().len() * c2.word_posteriors().len());
        for (&w1, &s1) in c1.word_posteriors() {
            let p1 = relative_prob(s1, total);
            for (&w2, &s2) in c2.word_posteriors() {
                let p2 = relative_prob(s2, total);
                values.push(p1 * p2 * self.word_pair_sim(w1, w2, use_phon));
            }
        }
        let pairs = values.len();
        self.aggregate(values.into_iter(), pairs)
    }

    /// Similarity recomputed for a pair that became a candidate through a
    /// merge. Stage 4 uses phones here, unlike its initial pass.
    fn stage_sim(&mut self, stage: Stage, c1: &Cluster, c2: &Cluster) -> f64 {
        match stage {
            Stage::IntraWord => self.compute_time_sim(c1, c2),
            Stage::Phonetic | Stage::TotalOrder => self.compute_phon_sim(c1, c2, true),
            Stage::Orthographic => self.compute_phon_sim(c1, c2, false),
        }
    }
}

/// Live pair from the arena.
fn pair(arena: &[Option<Cluster>], i: usize, j: usize) -> Option<(&Cluster, &Cluster)> {
    match (&arena[i], &arena[j]) {
        (Some(a), Some(b)) => Some((a, b)),
        _ => None,
    }
}

impl Clustering {
    /// Run one clustering stage.
    ///
    /// Pairs ordered by the constraints (in either direction) are never
    /// merged. With `constrained`, pairs whose time spans do not overlap
    /// are not candidates either. Stage [`Stage::TotalOrder`] additionally
    /// orders pairs that are far apart in time or connected within the
    /// configured reachability depth.
    pub fn go_cluster(
        &mut self,
        lat: &Lattice,
        prons: &Pronunciations,
        stage: Stage,
        linkage: Linkage,
        constrained: bool,
    ) {
        let n = self.clusters.len();
        let _span = debug_span!(
            "go_cluster",
            stage = stage.number(),
            %linkage,
            constrained,
            clusters = n
        )
        .entered();
        let cfg = &settings().clustering;
        let gap_limit = if lat.has_time_info() {
            cfg.total_order_time_gap
        } else {
            f64::from(cfg.total_order_unit_gap)
        };

        let mut scorer = Scorer::new(lat, prons, linkage, constrained);
        let mut sim = SimMatrix::new(n);
        for &(i, j) in &self.constraints {
            sim.order(i, j);
        }
        for i in 0..n {
            sim.order(i, i);
        }
        let mut arena: Vec<Option<Cluster>> =
            std::mem::take(&mut self.clusters).into_iter().map(Some).collect();
        let mut most_similar: Vec<Option<usize>> = vec![None; n];

        for id1 in 0..n {
            let mut best = 0.0;
            for id2 in 0..n {
                let mut s = 0.0;
                if id1 < id2 {
                    if sim.is_unknown(id1, id2) && sim.is_unknown(id2, id1) {
                        let Some((c1, c2)) = pair(&arena, id1, id2) else {
                            continue;
                        };
                        s = match stage {
                            Stage::IntraWord => {
                                if c1.word(lat) == c2.word(lat) {
                                    scorer.compute_time_sim(c1, c2)
                                } else {
                                    0.0
                                }
                            }
                            Stage::Phonetic => scorer.compute_phon_sim(c1, c2, true),
                            Stage::Orthographic => scorer.compute_phon_sim(c1, c2, false),
                            Stage::TotalOrder => {
                                let (first, second, i, j) = if c1.max_time() < c2.min_time() {
                                    (c1, c2, id1, id2)
                                } else {
                                    (c2, c1, id2, id1)
                                };
                                if second.min_time() - first.max_time() > gap_limit
                                    || first.compare_less(
                                        second,
                                        lat,
                                        &mut scorer.are_less,
                                        cfg.reachability_depth,
                                    )
                                {
                                    sim.order(i, j);
                                    0.0
                                } else {
                                    scorer.compute_phon_sim(c1, c2, false)
                                }
                            }
                        };
                    }
                } else if id1 > id2 {
                    s = sim.sim(id2, id1);
                }
                if s > 0.0 {
                    sim.set(id1, id2, Relation::Similar(s));
                    if s > best {
                        best = s;
                        most_similar[id1] = Some(id2);
                    }
                }
            }
        }

        let mut steps = 0usize;
        loop {
            let mut max_sim = 0.0;
            let mut best_pair = None;
            for id1 in 0..n {
                if arena[id1].is_none() {
                    continue;
                }
                if let Some(id2) = most_similar[id1] {
                    if arena[id2].is_some() && sim.sim(id1, id2) > max_sim {
                        max_sim = sim.sim(id1, id2);
                        best_pair = Some((id1, id2));
                    }
                }
            }
            let Some((a, b)) = best_pair else {
                break;
            };
            let (id1, id2) = if a < b { (a, b) } else { (b, a) };
            let Some(absorbed) = arena[id2].take() else {
                break;
            };
            let Some(survivor) = arena[id1].as_mut() else {
                break;
            };
            trace!(
                steps,
                similarity = max_sim,
                "merge\n{}{}",
                survivor.dump(lat, prons, true, false),
                absorbed.dump(lat, prons, true, false)
            );
            let n2 = absorbed.no_links() as f64;
            survivor.merge_with(lat, absorbed, stage);
            let n1 = survivor.no_links() as f64;
            steps += 1;

            let (mut liv, mut ljv, mut lio, mut ljo) = (Vec::new(), Vec::new(), Vec::new(), Vec::new());
            for i in 0..n {
                if i == id1 || arena[i].is_none() {
                    continue;
                }
                if let (
                    Relation::Similar(a),
                    Relation::Similar(_),
                    Relation::Similar(b),
                    Relation::Similar(_),
                ) = (sim.get(i, id1), sim.get(id1, i), sim.get(i, id2), sim.get(id2, i))
                {
                    let merged = match linkage {
                        Linkage::Max => a.max(b),
                        Linkage::Avg => (n1 * a + n2 * b) / (n1 + n2),
                    };
                    sim.set(i, id1, Relation::Similar(merged));
                    sim.set(id1, i, Relation::Similar(merged));
                }
                if sim.is_ordered(i, id1) {
                    liv.push(i);
                }
                if sim.is_ordered(i, id2) {
                    ljv.push(i);
                }
                if sim.is_ordered(id1, i) {
                    lio.push(i);
                }
                if sim.is_ordered(id2, i) {
                    ljo.push(i);
                }
                if sim.is_ordered(i, id2) {
                    sim.order(i, id1);
                }
                if sim.is_ordered(id2, i) {
                    sim.order(id1, i);
                }
            }
            // Whatever preceded one half now precedes whatever followed the other.
            for &i in &liv {
                for &j in &ljo {
                    sim.order(i, j);
                }
            }
            for &i in &lio {
                for &j in &ljv {
                    sim.order(j, i);
                }
            }

            if constrained {
                for src in 0..n {
                    let Some((source, merged)) = pair(&arena, src, id1) else {
                        continue;
                    };
                    let lost = (sim.is_unknown(src, id1)
                        && !sim.is_ordered(id1, src)
                        && sim.sim(src, id2) > 0.0
                        && !sim.is_ordered(id2, src))
                        || (sim.is_unknown(src, id2)
                            && !sim.is_ordered(id2, src)
                            && sim.sim(src, id1) > 0.0
                            && !sim.is_ordered(id1, src));
                    if lost {
                        let s = scorer.stage_sim(stage, source, merged);
                        sim.set(src, id1, Relation::from_similarity(s));
                        if s > 0.0 && !sim.is_ordered(id1, src) {
                            sim.set(id1, src, Relation::Similar(s));
                        }
                    }
                }
            }

            for src in 0..n {
                if arena[src].is_none() {
                    continue;
                }
                match most_similar[src] {
                    Some(closest) => {
                        if sim.is_constrained(src, closest)
                            || src == id1
                            || closest == id1
                            || closest == id2
                        {
                            let mut best = 0.0;
                            let mut best_id = None;
                            for id in 0..n {
                                if arena[id].is_none() || sim.is_constrained(src, id) {
                                    continue;
                                }
                                let s = sim.sim(src, id);
                                if s > best {
                                    best = s;
                                    best_id = Some(id);
                                }
                            }
                            most_similar[src] = best_id;
                        } else if let Relation::Similar(s) = sim.get(src, id1) {
                            if sim.sim(src, closest) < s && !sim.is_ordered(id1, src) {
                                most_similar[src] = Some(id1);
                            }
                        }
                    }
                    None => {
                        if constrained && sim.sim(src, id1) > 0.0 && !sim.is_ordered(id1, src) {
                            most_similar[src] = Some(id1);
                        }
                    }
                }
            }
        }

        let live: Vec<usize> = (0..n).filter(|&i| arena[i].is_some()).collect();
        let mut constraints = BTreeSet::new();
        for (r, &i) in live.iter().enumerate() {
            for (c, &j) in live.iter().enumerate() {
                if i != j && sim.is_ordered(i, j) {
                    constraints.insert((r, c));
                }
            }
        }
        self.constraints = constraints;
        self.clusters = arena
            .into_iter()
            .flatten()
            .enumerate()
            .map(|(k, mut c)| {
                c.id = k;
                c
            })
            .collect();
        debug!(
            merges = steps,
            clusters = self.clusters.len(),
            constraints = self.constraints.len(),
            "stage done"
        );
    }
}
