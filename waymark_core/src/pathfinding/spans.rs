// Bridge and tunnel annotation.
//
// Placement downstream stamps ordinary road blocks along a path but has to
// special-case two kinds of stretch: water crossings (bridges) and sustained
// steep grades (tunnels or cuts). `annotate_spans` marks both as half-open
// index ranges into the segment list, so the placer never re-samples
// terrain to find them.
//
// - Bridge: a run of consecutive segments whose centers are water columns,
//   at least `min_bridge_length` long.
// - Tunnel: a run of consecutive segments each reached by a step steeper
//   than `tunnel_grade` (height change over horizontal distance from the
//   previous center), at least `min_tunnel_length` long.

use crate::cache::TerrainSampler;
use crate::config::SpanParams;
use crate::types::{PathSegment, RoadSpan, SpanKind};

/// Half-open runs of `true` in `flags`, at least `min_len` long.
fn runs(flags: &[bool], min_len: usize) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut start = None;
    for (i, &f) in flags.iter().chain(std::iter::once(&false)).enumerate() {
        match (f, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                if i - s >= min_len.max(1) {
                    out.push((s, i));
                }
                start = None;
            }
            _ => {}
        }
    }
    out
}

/// Bridge and tunnel spans over `segments`, ordered by start index.
pub fn annotate_spans(
    segments: &[PathSegment],
    sampler: &TerrainSampler,
    params: &SpanParams,
) -> Vec<RoadSpan> {
    let wet: Vec<bool> = segments
        .iter()
        .map(|s| sampler.is_water_at(s.center))
        .collect();
    let steep: Vec<bool> = segments
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let Some(prev) = i.checked_sub(1).map(|j| &segments[j]) else {
                return false;
            };
            let run = s.center.distance(prev.center);
            run > 0.0 && ((s.height - prev.height).abs() as f64 / run) > params.tunnel_grade
        })
        .collect();

    let mut spans: Vec<RoadSpan> = runs(&wet, params.min_bridge_length)
        .into_iter()
        .map(|(start, end)| RoadSpan {
            kind: SpanKind::Bridge,
            start,
            end,
        })
        .chain(
            runs(&steep, params.min_tunnel_length)
                .into_iter()
                .map(|(start, end)| RoadSpan {
                    kind: SpanKind::Tunnel,
                    start,
                    end,
                }),
        )
        .collect();
    spans.sort_by_key(|s| (s.start, s.end));
    spans
}
