#[cfg(test)]
mod tests {
    use crate::stats::FitRow;
    use crate::summary::*;
    use crate::tests::derived_row;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_compose_filters_non_positive_weights() {
        let rows = vec![
            derived_row("T", "A", 0.6, 0.1, 6.0),
            derived_row("T", "B", 0.0, 0.05, 0.0),
            derived_row("T", "C", -0.1, 0.2, -0.5),
            derived_row("T", "D", 0.5, 0.1, 5.0),
        ];
        let spec = compose("T", &rows, &FitRow { p: 0.3, chisq: 2.0 });

        let labels: Vec<&str> = spec.slices.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["A", "D"]);
        assert_eq!(spec.slices[0].weight, 0.6);
        assert_eq!(spec.slices[1].weight, 0.5);
        assert_eq!(spec.title, "Target: T");

        // Every row still shows up in the statistics block
        for name in ["A", "B", "C", "D"] {
            assert!(
                spec.stats_block.lines().any(|l| l.starts_with(&format!("{:<40} |", name))),
                "missing {} in\n{}",
                name,
                spec.stats_block
            );
        }
    }

    #[test]
    fn test_compose_percent_labels() {
        let rows = vec![
            derived_row("T", "A", 0.7, 0.1, 7.0),
            derived_row("T", "B", 0.3, 0.05, 6.0),
        ];
        let spec = compose("T", &rows, &FitRow { p: 0.05, chisq: 3.2 });
        assert_eq!(spec.slices[0].percent_label, "70.0%");
        assert_eq!(spec.slices[1].percent_label, "30.0%");
    }

    #[test]
    fn test_compose_all_weights_non_positive() {
        let rows = vec![derived_row("T", "A", 0.0, 0.1, 0.0), derived_row("T", "B", -0.2, 0.1, -2.0)];
        let spec = compose("T", &rows, &FitRow { p: 0.3, chisq: 2.0 });
        assert!(spec.slices.is_empty());
        assert_eq!(spec.stats_block.lines().count(), 5 + 2);
    }

    #[test]
    fn test_format_stats_block_layout() {
        let rows = vec![
            derived_row("Target1", "A", 0.7, 0.1, 0.7 / 0.1),
            derived_row("Target1", "B", 0.3, 0.05, 0.3 / 0.05),
        ];
        let block = format_stats_block(&rows, &FitRow { p: 0.05, chisq: 3.2 });
        let rule = "-".repeat(60);
        let expected = format!(
            "P-Value: 0.0500\nχ²: 3.2000\n{rule}\n{:<40} | {:>7} | {:>7}\n{rule}\n{:<40} |  10.00% |    7.00\n{:<40} |   5.00% |    6.00\n",
            "Source",
            "SE (%)",
            "Z-score",
            "A",
            "B",
            rule = rule
        );
        assert_eq!(block, expected);
    }

    #[test]
    fn test_format_stats_block_negative_zscore() {
        let rows = vec![derived_row("T", "C", -0.1, 0.2, -0.5)];
        let block = format_stats_block(&rows, &FitRow { p: 1.0, chisq: 0.0 });
        assert!(block.ends_with(&format!("{:<40} |  20.00% |   -0.50\n", "C")));
        assert!(block.starts_with("P-Value: 1.0000\nχ²: 0.0000\n"));
    }

    #[test]
    fn test_render_svg_content() {
        let rows = vec![
            derived_row("Tar<get>", "A&B", 0.7, 0.1, 7.0),
            derived_row("Tar<get>", "C", 0.3, 0.05, 6.0),
        ];
        let spec = compose("Tar<get>", &rows, &FitRow { p: 0.05, chisq: 3.2 });
        let svg = render_svg(&spec).unwrap();

        assert!(svg.contains("<svg"));
        assert!(svg.trim_end().ends_with("</svg>"));
        assert!(svg.contains("Target: Tar&lt;get&gt;"));
        assert!(svg.contains("A&amp;B"));
        assert!(svg.contains("70.0%"));
        assert!(svg.contains("30.0%"));
        assert_eq!(svg.matches("<polygon").count(), 2);
        assert!(svg.contains("0.0500"));
        assert!(svg.contains("monospace"));
    }

    #[test]
    fn test_render_svg_single_slice_is_full_circle() {
        let rows = vec![derived_row("T", "A", 1.0, 0.0, 0.0)];
        let spec = compose("T", &rows, &FitRow { p: 0.5, chisq: 1.0 });
        let svg = render_svg(&spec).unwrap();
        assert_eq!(svg.matches("<circle").count(), 1);
        assert_eq!(svg.matches("<polygon").count(), 0);
        assert!(svg.contains("100.0%"));
    }

    #[test]
    fn test_render_svg_without_slices() {
        let rows = vec![derived_row("T", "A", -0.1, 0.1, -1.0)];
        let spec = compose("T", &rows, &FitRow { p: 0.5, chisq: 1.0 });
        let svg = render_svg(&spec).unwrap();
        assert_eq!(svg.matches("<polygon").count(), 0);
        assert_eq!(svg.matches("<circle").count(), 0);
        assert!(svg.contains("Target: T"));
    }

    #[test]
    fn test_write_svg_to_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("results_T.svg");
        let rows = vec![derived_row("T", "A", 0.5, 0.1, 5.0), derived_row("T", "B", 0.5, 0.1, 5.0)];
        let spec = compose("T", &rows, &FitRow { p: 0.5, chisq: 1.0 });

        write_svg(&path, &spec).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(written.matches("<polygon").count(), 2);
        assert!(written.contains("Target: T"));
    }
}
