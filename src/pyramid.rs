use crate::all::*;

// Levels 1..=level_count of an image pyramid. Level 0 is the source image
// itself and is not stored here.
pub struct Pyramid {
  pub levels: Vec<Image>,
}

impl Pyramid {
  pub fn new(
    image: &Image,
    unused_pyramid: Option<Pyramid>,
    level_count: usize,
  ) -> Pyramid {
    Pyramid {
      levels: compute_levels(
        image,
        unused_pyramid.map(|x| x.levels),
        level_count,
      ),
    }
  }
}

fn compute_levels(
  image: &Image,
  unused_levels: Option<Vec<Image>>,
  level_count: usize,
) -> Vec<Image> {
  let mut levels = unused_levels.unwrap_or_default();
  levels.resize_with(level_count, Image::empty);
  for level_ind in 0..level_count {
    // Split to borrow the parent non-mutably and the child mutably.
    let (parents, children) = levels.split_at_mut(level_ind);
    let parent = if level_ind > 0 { &parents[level_ind - 1] } else { image };
    parent.downscale_into(&mut children[0]);
  }
  levels
}
