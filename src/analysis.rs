//! Per-marker observed and permuted statistics on top of the dispatcher,
//! and an in-memory driver producing adjusted p-values for a marker set.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::{
    nominal_p_value, single_step, Booster, Config, Encoding, Error, Label, Marker, Memberships,
    NullDistribution, PathTally, PermutationMatrix, PermutationSource, StepDown,
};

/// Statistics of one marker on the real labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observed {
    /// One value per configured test, in configuration order.
    pub statistics: Vec<f64>,
    pub max:        f64,
    /// Asymptotic p-value of the test reaching `max`.
    pub nominal_p:  f64,
}

/// One analysis over a fixed label vector. Holds the current block of
/// permutations and everything reused from marker to marker.
#[derive(Debug)]
pub struct Analysis<T: Label> {
    config:      Config,
    matrix:      PermutationMatrix<T>,
    booster:     Booster<T>,
    memberships: Memberships,
    aggregates:  Vec<Vec<T>>,
    drawn:       usize,
    block:       usize,
}

impl<T: Label> Analysis<T> {
    #[tracing::instrument(skip(config, labels))]
    pub fn new(config: Config, labels: Vec<T>) -> Result<Self, Error> {
        config.validate()?;
        if let Some(&test) = config.tests.iter().find(|&&t| !T::supports(t)) {
            return Err(Error::UnsupportedTest(test));
        }
        let samples = labels.len();
        let size = config.block_size.min(config.permutations);
        let matrix = PermutationMatrix::new(
            size,
            PermutationSource::new(config.seed),
            labels,
            config.bit_form,
        )?;
        let slots = config.encoding.slots();
        let booster = Booster::new(
            slots,
            samples,
            config.tail,
            config.sparse_divisor,
            config.similarity_divisor,
        );
        debug!(
            "Dispatcher thresholds: sparse {}, similarity {}",
            booster.sparse_threshold(),
            booster.similarity_threshold()
        );
        Ok(Self {
            memberships: Memberships::new(config.encoding, samples),
            aggregates: vec![Vec::new(); slots],
            drawn: size,
            block: 0,
            config,
            matrix,
            booster,
        })
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn matrix(&self) -> &PermutationMatrix<T> {
        &self.matrix
    }

    /// Paths taken by the dispatcher in the current block so far.
    #[inline]
    pub fn tally(&self) -> PathTally {
        self.booster.tally()
    }

    /// Permutations in the current block.
    #[inline]
    pub fn permutations(&self) -> usize {
        self.matrix.permutations()
    }

    /// Permutations drawn so far, the current block included.
    #[inline]
    pub fn drawn(&self) -> usize {
        self.drawn
    }

    pub fn observed(&mut self, marker: Marker<'_>) -> Result<Observed, Error> {
        self.memberships.fill(marker)?;
        let statistics = match self.config.encoding {
            Encoding::Genotype => self.observed_with::<3>(),
            Encoding::Allelic => self.observed_with::<2>(),
        };
        let (best, max) = statistics
            .iter()
            .enumerate()
            .fold((0, 0.0f64), |(bi, bm), (i, &s)| if s > bm { (i, s) } else { (bi, bm) });
        let nominal_p = nominal_p_value(self.config.tests[best], max, self.config.encoding.codes());
        Ok(Observed {
            statistics,
            max,
            nominal_p,
        })
    }

    fn observed_with<const L: usize>(&self) -> Vec<f64> {
        let labels = self.matrix.labels();
        let slots = self.memberships.slots();
        let cells: [T; L] = std::array::from_fn(|j| {
            let mut sum = T::default();
            for &i in slots[j].indices() {
                sum += labels[i as usize];
            }
            sum
        });
        let totals = self.memberships.totals::<L>();
        self.config
            .tests
            .iter()
            .map(|&test| T::statistic(test, &self.config.trend, &cells, &totals))
            .collect()
    }

    /// Write into `out` the maximum over the configured tests of the
    /// marker's statistic under each permutation of the current block.
    pub fn permuted(&mut self, marker: Marker<'_>, out: &mut [f64]) -> Result<(), Error> {
        if out.len() != self.matrix.permutations() {
            return Err(Error::PermutationLengthMismatch {
                expected: self.matrix.permutations(),
                found:    out.len(),
            });
        }
        self.memberships.fill(marker)?;
        self.booster
            .count(&self.matrix, self.memberships.slots(), &mut self.aggregates)?;
        match self.config.encoding {
            Encoding::Genotype => self.permuted_with::<3>(out),
            Encoding::Allelic => self.permuted_with::<2>(out),
        }
        Ok(())
    }

    fn permuted_with<const L: usize>(&self, out: &mut [f64]) {
        let totals = self.memberships.totals::<L>();
        let tests = &self.config.tests;
        for (k, o) in out.iter_mut().enumerate() {
            let cells: [T; L] = std::array::from_fn(|j| self.aggregates[j][k]);
            *o = tests
                .iter()
                .map(|&test| T::statistic(test, &self.config.trend, &cells, &totals))
                .fold(0.0, f64::max);
        }
    }

    /// Draw the next block of permutations, shorter than the configured
    /// block size if fewer remain. Returns false once every permutation has
    /// been drawn.
    pub fn next_block(&mut self) -> bool {
        let tally = self.booster.take_tally();
        debug!("Block {} done, dispatcher paths {:?}", self.block, tally);
        if self.drawn >= self.config.permutations {
            return false;
        }
        let size = self
            .config
            .block_size
            .min(self.config.permutations - self.drawn);
        self.matrix.reshuffle_with(size);
        self.booster.reset();
        self.drawn += size;
        self.block += 1;
        true
    }
}

/// Element-wise maximum of a marker's permuted statistics into the running
/// per-permutation maxima.
#[inline]
pub fn fold_max(running: &mut [f64], permuted: &[f64]) {
    debug_assert_eq!(running.len(), permuted.len());
    for (r, &p) in running.iter_mut().zip(permuted.iter()) {
        if p > *r {
            *r = p;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerResult {
    pub statistics:  Vec<f64>,
    pub max:         f64,
    pub nominal_p:   f64,
    pub single_step: f64,
    pub step_down:   Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// In input order.
    pub markers:      Vec<MarkerResult>,
    /// Per-permutation maxima over all markers, increasing.
    pub null:         Vec<f64>,
    pub permutations: usize,
}

/// Test every marker against `labels` and adjust for multiple testing with
/// the maximum statistic of each permutation.
#[tracing::instrument(skip(config, labels, markers))]
pub fn run<T: Label>(
    config: &Config,
    labels: Vec<T>,
    markers: &[Marker<'_>],
) -> Result<Report, Error> {
    info!(
        "Testing {} markers on {} samples with {} permutations",
        markers.len(),
        labels.len(),
        config.permutations
    );
    let mut analysis = Analysis::new(config.clone(), labels)?;
    let observed = markers
        .iter()
        .map(|&m| analysis.observed(m))
        .collect::<Result<Vec<_>, _>>()?;

    // most significant first
    let mut order = (0..markers.len()).collect::<Vec<_>>();
    order.sort_by(|&a, &b| observed[b].max.total_cmp(&observed[a].max));
    let ranked = order.iter().map(|&i| observed[i].max).collect::<Vec<_>>();

    let mut step_down = if config.step_down {
        Some(StepDown::new(ranked.clone())?)
    } else {
        None
    };
    let mut null = NullDistribution::new();
    let mut permuted = Vec::new();
    loop {
        let p = analysis.permutations();
        permuted.resize(p, 0.0);
        match &mut step_down {
            Some(step_down) => {
                step_down.begin_block(p);
                for rank in (0..markers.len()).rev() {
                    analysis.permuted(markers[order[rank]], &mut permuted)?;
                    step_down.fold(rank, &permuted)?;
                }
                null.extend(step_down.finish_block()?);
            },
            None => {
                let mut maxima = vec![0.0; p];
                for &marker in markers {
                    analysis.permuted(marker, &mut permuted)?;
                    fold_max(&mut maxima, &permuted);
                }
                null.extend(&maxima);
            },
        }
        trace!("{} of {} permutations done", analysis.drawn(), config.permutations);
        if !analysis.next_block() {
            break;
        }
    }

    let single = single_step(&ranked, null.sorted())?;
    let stepped = step_down.map(|s| s.p_values());
    let mut results = observed
        .into_iter()
        .map(|o| MarkerResult {
            statistics:  o.statistics,
            max:         o.max,
            nominal_p:   o.nominal_p,
            single_step: 1.0,
            step_down:   None,
        })
        .collect::<Vec<_>>();
    for (rank, &i) in order.iter().enumerate() {
        results[i].single_step = single[rank];
        results[i].step_down = stepped.as_ref().map(|s| s[rank]);
    }
    let permutations = null.len();
    info!("Finished {} permutations", permutations);
    Ok(Report {
        markers: results,
        null: null.sorted().to_vec(),
        permutations,
    })
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use rand_distr::{Distribution, Normal};
    use test_log::test;

    use super::*;
    use crate::{dichotomous, stats, Moments, Table, Test, MISSING};

    fn genotypes(raw: &[Vec<u8>]) -> Vec<Marker<'_>> {
        raw.iter().map(|m| Marker::genotype(m)).collect()
    }

    fn case_control(n: usize, seed: u64) -> Vec<u32> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n).map(|_| rng.gen_bool(0.5) as u32).collect()
    }

    fn random_markers(n: usize, count: usize, codes: u8, seed: u64) -> Vec<Vec<u8>> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut marker = (0..n).map(|_| rng.gen_range(0..codes)).collect::<Vec<_>>();
        (0..count)
            .map(|_| {
                for v in marker.iter_mut() {
                    if rng.gen_bool(0.05) {
                        *v = if rng.gen_bool(0.05) {
                            MISSING
                        } else {
                            rng.gen_range(0..codes)
                        };
                    }
                }
                marker.clone()
            })
            .collect()
    }

    /// A marker whose genotype is 2 for every case and 0 for every control.
    fn causal(labels: &[u32]) -> Vec<u8> {
        labels.iter().map(|&l| 2 * l as u8).collect()
    }

    #[test]
    fn test_observed() {
        let labels = dichotomous(&[true; 10].into_iter().chain([false; 10]).collect::<Vec<_>>());
        let config = Config {
            permutations: 10,
            tests: vec![Test::Trend, Test::ChiSquare],
            ..Default::default()
        };
        let mut analysis = Analysis::new(config, labels.clone()).unwrap();
        let observed = analysis.observed(Marker::genotype(&causal(&labels))).unwrap();
        let table = Table::new([0, 0, 10], [10, 0, 0]);
        assert_eq!(observed.statistics, vec![
            stats::trend(&table, &stats::ADDITIVE_WEIGHTS),
            stats::chi_square(&table)
        ]);
        assert_eq!(observed.statistics[0], 20.0);
        assert_eq!(observed.max, 20.0);
        assert!(observed.nominal_p < 1e-4);
    }

    #[test]
    fn test_observed_excludes_missing() {
        let labels = vec![1u32, 1, 0, 0, 1, 0];
        let config = Config {
            permutations: 4,
            encoding: Encoding::Allelic,
            tests: vec![Test::ChiSquare],
            ..Default::default()
        };
        let mut analysis = Analysis::new(config, labels).unwrap();
        let observed = analysis
            .observed(Marker::allelic(&[1, 1, 0, 0, MISSING, MISSING]))
            .unwrap();
        let table = Table::new([0, 2], [2, 0]);
        assert_eq!(observed.statistics, vec![stats::chi_square(&table)]);
        assert_eq!(observed.max, 4.0);
    }

    fn check_permuted<T: Label>(config: Config, labels: Vec<T>, markers: &[Vec<u8>]) {
        let tests = config.tests.clone();
        let trend = config.trend;
        let mut analysis = Analysis::new(config, labels).unwrap();
        let p = analysis.permutations();
        let mut out = vec![0.0; p];
        for marker in markers {
            analysis
                .permuted(Marker::genotype(marker), &mut out)
                .unwrap();
            for (k, &got) in out.iter().enumerate() {
                let column = analysis.matrix().column(k);
                let mut cells = [T::default(); 3];
                let mut totals = [0u32; 3];
                for (&v, &l) in marker.iter().zip(column.iter()) {
                    if v != MISSING {
                        cells[v as usize] += l;
                        totals[v as usize] += 1;
                    }
                }
                let expected = tests
                    .iter()
                    .map(|&t| T::statistic(t, &trend, &cells, &totals))
                    .fold(0.0, f64::max);
                assert!(
                    (got - expected).abs() <= 1e-9 * expected.abs().max(1.0),
                    "permutation {k}: {got} != {expected}"
                );
            }
        }
    }

    #[test]
    fn test_permuted_matches_brute_force() {
        let config = Config {
            permutations: 40,
            tests: vec![Test::Trend, Test::ExtendedTrend, Test::ChiSquare],
            ..Default::default()
        };
        check_permuted(config, case_control(150, 1), &random_markers(150, 25, 3, 2));
    }

    #[test]
    fn test_permuted_quantitative_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(3);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let values = (0..120).map(|_| normal.sample(&mut rng)).collect::<Vec<f64>>();
        let config = Config {
            permutations: 30,
            ..Config::quantitative()
        };
        check_permuted(
            config,
            Moments::from_values(&values, true),
            &random_markers(120, 20, 3, 4),
        );
    }

    #[test]
    fn test_next_block_sizes() {
        let config = Config {
            permutations: 25,
            block_size: 10,
            ..Default::default()
        };
        let mut analysis = Analysis::new(config, case_control(30, 5)).unwrap();
        let mut sizes = vec![analysis.permutations()];
        while analysis.next_block() {
            sizes.push(analysis.permutations());
        }
        assert_eq!(sizes, vec![10, 10, 5]);
        assert_eq!(analysis.drawn(), 25);
        assert!(!analysis.next_block());
    }

    #[test]
    fn test_fold_max() {
        let mut running = vec![0.0, 2.0, 1.0];
        fold_max(&mut running, &[1.0, 1.0, 3.0]);
        assert_eq!(running, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_run_finds_causal_marker() {
        let labels = case_control(80, 6);
        let mut markers = random_markers(80, 20, 3, 7);
        markers.insert(10, causal(&labels));
        let config = Config {
            permutations: 200,
            block_size: 64,
            seed: 42,
            ..Default::default()
        };
        let report = run(&config, labels, &genotypes(&markers)).unwrap();
        assert_eq!(report.permutations, 200);
        assert_eq!(report.null.len(), 200);
        assert!(report.null.windows(2).all(|w| w[0] <= w[1]));
        let best = &report.markers[10];
        assert_eq!(best.single_step, 1.0 / 201.0);
        assert!(best.step_down.is_none());
        for (i, m) in report.markers.iter().enumerate() {
            assert!(m.single_step >= best.single_step, "marker {i}");
            assert!(m.single_step <= 1.0);
        }
        serde_json::to_string(&report).unwrap();
    }

    #[test]
    fn test_block_size_does_not_change_results() {
        let labels = case_control(60, 8);
        let raw = random_markers(60, 15, 3, 9);
        let markers = genotypes(&raw);
        let config = Config {
            permutations: 25,
            tests: vec![Test::Trend, Test::ChiSquare],
            ..Default::default()
        };
        let whole = run(&config, labels.clone(), &markers).unwrap();
        let blocked = run(
            &Config {
                block_size: 10,
                ..config.clone()
            },
            labels.clone(),
            &markers,
        )
        .unwrap();
        assert_eq!(whole, blocked);
        let without_bits = run(
            &Config {
                bit_form: false,
                ..config
            },
            labels,
            &markers,
        )
        .unwrap();
        assert_eq!(whole, without_bits);
    }

    #[test]
    fn test_step_down_is_sharper() {
        let labels = case_control(70, 10);
        let mut markers = random_markers(70, 12, 3, 11);
        markers.push(causal(&labels));
        let markers = genotypes(&markers);
        let config = Config {
            permutations: 100,
            block_size: 30,
            ..Default::default()
        };
        let single = run(&config, labels.clone(), &markers).unwrap();
        let stepped = run(
            &Config {
                step_down: true,
                ..config
            },
            labels,
            &markers,
        )
        .unwrap();
        assert_eq!(single.null, stepped.null);
        let mut by_rank = stepped.markers.clone();
        by_rank.sort_by(|a, b| b.max.total_cmp(&a.max));
        let p = by_rank
            .iter()
            .map(|m| m.step_down.unwrap())
            .collect::<Vec<_>>();
        assert!(p.windows(2).all(|w| w[0] <= w[1]));
        for m in &stepped.markers {
            let sd = m.step_down.unwrap();
            assert!(sd <= m.single_step + 1e-15);
        }
        assert_eq!(by_rank[0].step_down, Some(by_rank[0].single_step));
    }

    #[test]
    fn test_run_allelic() {
        let labels = case_control(50, 12);
        let raw = random_markers(50, 10, 2, 13);
        let markers = raw.iter().map(|m| Marker::allelic(m)).collect::<Vec<_>>();
        let config = Config {
            permutations: 50,
            encoding: Encoding::Allelic,
            tests: vec![Test::ChiSquare],
            ..Default::default()
        };
        let report = run(&config, labels, &markers).unwrap();
        assert_eq!(report.markers.len(), 10);
        assert!(report
            .markers
            .iter()
            .all(|m| m.single_step > 0.0 && m.single_step <= 1.0));
    }

    #[test]
    fn test_run_quantitative() {
        let mut rng = StdRng::seed_from_u64(14);
        let noise = Normal::new(0.0, 0.3).unwrap();
        let markers = random_markers(90, 10, 3, 15);
        // trait driven by the additive dose of marker 4
        let values = markers[4]
            .iter()
            .map(|&g| {
                let dose = if g == MISSING { 1.0 } else { g as f64 };
                dose + noise.sample(&mut rng)
            })
            .collect::<Vec<_>>();
        let config = Config {
            permutations: 100,
            ..Config::quantitative()
        };
        let report = run(
            &config,
            Moments::from_values(&values, true),
            &genotypes(&markers),
        )
        .unwrap();
        assert_eq!(report.markers[4].single_step, 1.0 / 101.0);
    }

    #[test]
    fn test_errors() {
        let values = [0.5, 1.5, -0.3, 0.1];
        assert!(matches!(
            Analysis::new(Config::default(), Moments::from_values(&values, false)),
            Err(Error::UnsupportedTest(Test::Trend))
        ));
        assert!(matches!(
            Analysis::new(
                Config {
                    tests: vec![Test::Regression],
                    ..Default::default()
                },
                Moments::from_values(&values, false)
            ),
            Err(Error::BitFormUnsupported)
        ));
        let config = Config {
            permutations: 8,
            ..Default::default()
        };
        let mut analysis = Analysis::new(config, vec![1u32, 0, 1, 0]).unwrap();
        assert!(matches!(
            analysis.observed(Marker::genotype(&[0, 1, 2])),
            Err(Error::SampleSizeMismatch {
                expected: 4,
                found:    3,
            })
        ));
        assert!(matches!(
            analysis.observed(Marker::genotype(&[0, 1, 3, 0])),
            Err(Error::InvalidCode {
                value:    3,
                position: 2,
            })
        ));
        let mut out = vec![0.0; 7];
        assert!(matches!(
            analysis.permuted(Marker::genotype(&[0, 1, 2, 0]), &mut out),
            Err(Error::PermutationLengthMismatch { .. })
        ));
        let mut out = vec![0.0; 8];
        assert!(matches!(
            analysis.permuted(Marker::allelic(&[0, 1, 1, 0]), &mut out),
            Err(Error::EncodingMismatch {
                expected: Encoding::Genotype,
                found:    Encoding::Allelic,
            })
        ));
        assert!(matches!(
            analysis.observed(Marker::new(&[0, 1, 1, 0], &[0, 1, 2, 3])),
            Err(Error::UnsupportedCardinality(4))
        ));
    }

    #[test]
    fn test_marker_domain_relabels_codes() {
        let labels = case_control(40, 16);
        let raw = random_markers(40, 1, 3, 17).remove(0);
        // the same genotypes written as 10, 20 and 30
        let recoded = raw
            .iter()
            .map(|&v| if v == MISSING { v } else { 10 * (v + 1) })
            .collect::<Vec<_>>();
        let config = Config {
            permutations: 16,
            ..Default::default()
        };
        let mut analysis = Analysis::new(config, labels).unwrap();
        assert_eq!(
            analysis.observed(Marker::genotype(&raw)).unwrap(),
            analysis
                .observed(Marker::new(&recoded, &[10, 20, 30]))
                .unwrap()
        );
        let mut expected = vec![0.0; 16];
        analysis
            .permuted(Marker::genotype(&raw), &mut expected)
            .unwrap();
        let mut got = vec![0.0; 16];
        analysis
            .permuted(Marker::new(&recoded, &[10, 20, 30]), &mut got)
            .unwrap();
        assert_eq!(got, expected);
    }
}
