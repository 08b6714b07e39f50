mod t_weave;
