use crate::all::*;

// Tops `tracks` up towards `max_tracks` with new features placed on open
// pixels of `mask`. Nothing is detected unless more than a quarter of the
// target is missing. Every new feature gets a fresh id and age 1, and closes
// a disk of `min_distance` in the mask. Returns the number of new features.
pub fn replenish(
  detector: &mut dyn FeatureDetector,
  image: &Image,
  mask: &mut Mask,
  tracks: &mut Vec<Track>,
  ids: &mut IdAllocator,
  p: &ParameterSet,
) -> Result<usize> {
  mask.check_size(image.width, image.height)?;
  let shortfall = p.max_tracks.saturating_sub(tracks.len());
  if shortfall <= p.max_tracks / 4 {
    debug!("Skipping detection, {} of {} features tracked.", tracks.len(), p.max_tracks);
    return Ok(0);
  }

  let candidates = detector.detect(image, mask, shortfall);
  let mut added = 0;
  for candidate in candidates {
    if added >= shortfall { break }
    if !mask.is_open(&candidate) { continue }
    mask.close_disk(&candidate, p.min_distance);
    tracks.push(Track::new(ids.next_id(), 0, candidate, 1));
    added += 1;
  }
  debug!("Detected {} new features for a shortfall of {}.", added, shortfall);
  Ok(added)
}
